//! Routing core for the IPC router.
//!
//! A [`Router`] owns the node registry, the local port table and every
//! per-node flow table. Transports hand it raw frames through
//! [`Router::deliver`]; local users talk through [`Socket`]s.

pub mod endpoint;
pub mod error;
pub mod flow;
pub mod forward;
pub mod message;
pub mod node;
pub mod ports;
pub mod router;
mod sync;
pub mod testing;

pub use endpoint::{BoxFuture, Endpoint};
pub use error::{EndpointError, RouterError};
pub use message::Message;
pub use node::NodeHandle;
pub use router::{PeerState, Router, RouterConfig, Socket};
