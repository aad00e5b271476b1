//! Router error types.

use ipcr_core::PacketError;

/// Failure reported by an [`Endpoint`](crate::Endpoint) transmit.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint disconnected")]
    Disconnected,
    #[error("transmit failed: {0}")]
    TransmitFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid address")]
    InvalidAddress,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unknown destination")]
    UnknownDestination,

    #[error("out of memory")]
    NoMemory,

    #[error("no buffer space")]
    NoBufferSpace,

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] PacketError),

    #[error("peer gone")]
    PeerGone,

    #[error("port in use")]
    PortInUse,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not connected")]
    NotConnected,

    #[error("connection reset")]
    ConnectionReset,

    #[error("operation would block")]
    WouldBlock,

    #[error("network reset")]
    NetworkReset,

    #[error("socket closed")]
    Closed,

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

impl From<std::collections::TryReserveError> for RouterError {
    fn from(_: std::collections::TryReserveError) -> Self {
        RouterError::NoMemory
    }
}
