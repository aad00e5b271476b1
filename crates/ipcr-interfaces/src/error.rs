//! Error types for the link layer.

use ipcr_core::PacketError;
use ipcr_router::RouterError;

#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] PacketError),
    #[error("payload of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },
    #[error("router error: {0}")]
    Router(#[from] RouterError),
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}
