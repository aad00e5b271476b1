//! Error types for the router daemon.

use ipcr_interfaces::InterfaceError;
use ipcr_router::RouterError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),
    #[error("router error: {0}")]
    Router(#[from] RouterError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("node already running")]
    AlreadyRunning,
}
