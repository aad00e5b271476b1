//! TOML configuration for the router daemon.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use ipcr_core::WireVersion;
use ipcr_interfaces::tcp::{TcpClientConfig, TcpServerConfig};
use ipcr_router::RouterConfig;
use ipcr_router::router::{DEFAULT_LOCAL_NODE, DEFAULT_NODE_BACKLOG, DEFAULT_SOCKET_QUEUE};
use serde::Deserialize;

use crate::error::NodeError;

#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub links: LinksSection,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// The `[router]` section as a validated [`RouterConfig`].
    pub fn router_config(&self) -> Result<RouterConfig, NodeError> {
        let config = RouterConfig {
            local_node: self.router.local_node,
            wire_version: parse_wire_version(&self.router.wire_version)?,
            socket_queue: self.router.socket_queue,
            node_backlog: self.router.node_backlog,
        };
        config
            .validate()
            .map_err(|e| NodeError::Config(format!("[router]: {e}")))?;
        Ok(config)
    }
}

/// The `[router]` section.
#[derive(Debug, Deserialize)]
pub struct RouterSection {
    #[serde(default = "default_local_node")]
    pub local_node: u32,
    /// `"v1"` or `"v2"`.
    #[serde(default = "default_wire_version")]
    pub wire_version: String,
    #[serde(default = "default_socket_queue")]
    pub socket_queue: usize,
    #[serde(default = "default_node_backlog")]
    pub node_backlog: usize,
    /// Bind the control port and answer HELLOs. Turn off when another
    /// process owns the control port.
    #[serde(default = "default_answer_hello")]
    pub answer_hello: bool,
}

fn default_local_node() -> u32 {
    DEFAULT_LOCAL_NODE
}

fn default_wire_version() -> String {
    "v1".to_string()
}

fn default_socket_queue() -> usize {
    DEFAULT_SOCKET_QUEUE
}

fn default_node_backlog() -> usize {
    DEFAULT_NODE_BACKLOG
}

fn default_answer_hello() -> bool {
    true
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            local_node: default_local_node(),
            wire_version: default_wire_version(),
            socket_queue: default_socket_queue(),
            node_backlog: default_node_backlog(),
            answer_hello: default_answer_hello(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The `[links]` section.
#[derive(Debug, Default, Deserialize)]
pub struct LinksSection {
    #[serde(default)]
    pub tcp_client: Vec<TcpClientEntry>,
    #[serde(default)]
    pub tcp_server: Vec<TcpServerEntry>,
}

/// A `[[links.tcp_client]]` entry.
#[derive(Debug, Deserialize)]
pub struct TcpClientEntry {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub net_id: u32,
    pub node_id: Option<u32>,
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    pub max_reconnect_tries: Option<u32>,
}

fn default_reconnect_secs() -> u64 {
    5
}

impl TcpClientEntry {
    pub fn to_link_config(&self) -> TcpClientConfig {
        let mut config = TcpClientConfig::new(self.name.clone(), self.target.clone());
        config.net_id = self.net_id;
        config.node_id = self.node_id;
        config.reconnect_wait = Duration::from_secs(self.reconnect_secs);
        config.max_reconnect_tries = self.max_reconnect_tries;
        config
    }
}

/// A `[[links.tcp_server]]` entry.
#[derive(Debug, Deserialize)]
pub struct TcpServerEntry {
    pub name: String,
    pub bind: String,
    #[serde(default)]
    pub net_id: u32,
}

impl TcpServerEntry {
    pub fn to_link_config(&self) -> Result<TcpServerConfig, NodeError> {
        let mut config = TcpServerConfig::new(self.name.clone(), parse_socket_addr(&self.bind)?);
        config.net_id = self.net_id;
        Ok(config)
    }
}

pub fn parse_wire_version(s: &str) -> Result<WireVersion, NodeError> {
    match s.to_lowercase().as_str() {
        "v1" | "1" => Ok(WireVersion::V1),
        "v2" | "2" => Ok(WireVersion::V2),
        other => Err(NodeError::Config(format!("unknown wire version: {other}"))),
    }
}

pub fn parse_socket_addr(s: &str) -> Result<SocketAddr, NodeError> {
    s.parse()
        .map_err(|e| NodeError::Config(format!("invalid socket address '{s}': {e}")))
}
