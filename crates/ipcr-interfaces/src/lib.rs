//! Transport links for the IPC router.
//!
//! Any byte stream becomes a router endpoint through [`stream::attach`]:
//! frame boundaries are recovered with the header's size field, frames are
//! fed to [`Router::deliver`](ipcr_router::Router::deliver), and the node is
//! unregistered when the stream ends. TCP and in-memory helpers build on it.

pub mod error;
pub mod framing;
pub mod memory;
pub mod shutdown;
pub mod stream;
pub mod tcp;

pub use error::InterfaceError;
pub use framing::FrameAccumulator;
pub use shutdown::ShutdownToken;
pub use stream::{Link, LinkOptions, StreamLink, attach};
