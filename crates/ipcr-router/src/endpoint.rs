//! The seam between the router and a transport driver.

use std::future::Future;
use std::pin::Pin;

use crate::error::EndpointError;

/// Boxed future returned by [`Endpoint::transmit`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A point-to-point link to one remote processor.
///
/// The router serializes calls to [`transmit`](Endpoint::transmit) per node,
/// so an implementation never sees two concurrent transmits from the same
/// registration.
pub trait Endpoint: Send + Sync + 'static {
    /// Human-readable name used in logs (e.g. `"tcp[10.0.0.2:5000]"`).
    fn name(&self) -> &str;

    /// Whether the endpoint is able to send at all.
    ///
    /// Registration is refused for endpoints that report `false`.
    fn can_transmit(&self) -> bool {
        true
    }

    /// Hand one fully framed message to the transport.
    fn transmit(&self, frame: Vec<u8>) -> BoxFuture<'_, Result<(), EndpointError>>;
}
