//! Router daemon.
//!
//! Loads a TOML configuration, builds a [`Router`](ipcr_router::Router),
//! brings up the configured TCP links and answers HELLO handshakes on the
//! control port.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{Node, ShutdownHandle};
