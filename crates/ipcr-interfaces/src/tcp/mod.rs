//! TCP links.
//!
//! [`TcpClient`] dials a remote router and redials when the stream drops;
//! [`TcpListenerLink`] accepts connections and attaches each one as its own
//! node. Both produce ordinary stream [`Link`](crate::Link)s.

pub mod client;
pub mod server;

pub use client::{TcpClient, connect};
pub use server::TcpListenerLink;

use std::net::SocketAddr;
use std::time::Duration;

/// Delay between reconnection attempts.
pub const RECONNECT_WAIT: Duration = Duration::from_secs(5);

/// Timeout for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound TCP link settings.
#[derive(Debug, Clone)]
pub struct TcpClientConfig {
    pub name: String,
    /// `host:port` of the remote router.
    pub target: String,
    pub net_id: u32,
    /// Id of the remote node, if known before its first frame.
    pub node_id: Option<u32>,
    pub connect_timeout: Duration,
    pub reconnect_wait: Duration,
    /// Give up after this many consecutive failures (`None` = never).
    pub max_reconnect_tries: Option<u32>,
}

impl TcpClientConfig {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            net_id: 0,
            node_id: None,
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_wait: RECONNECT_WAIT,
            max_reconnect_tries: None,
        }
    }
}

/// Listening TCP link settings. Every accepted peer joins segment `net_id`.
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    pub name: String,
    pub bind_addr: SocketAddr,
    pub net_id: u32,
}

impl TcpServerConfig {
    pub fn new(name: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            bind_addr,
            net_id: 0,
        }
    }
}
