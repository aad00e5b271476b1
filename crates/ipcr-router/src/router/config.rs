//! Router configuration.

use ipcr_core::constants::NODE_BROADCAST_LEGACY;
use ipcr_core::{NODE_BROADCAST, WireVersion};

use crate::error::RouterError;

pub const DEFAULT_LOCAL_NODE: u32 = 1;
pub const DEFAULT_SOCKET_QUEUE: usize = 64;
pub const DEFAULT_NODE_BACKLOG: usize = 256;

/// Tunables of a [`Router`](super::Router).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Id of this processor.
    pub local_node: u32,
    /// Header format used for every outbound frame.
    pub wire_version: WireVersion,
    /// Receive queue depth of each socket.
    pub socket_queue: usize,
    /// Inbound frames buffered per node while another caller drains.
    pub node_backlog: usize,
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.local_node == NODE_BROADCAST {
            return Err(RouterError::InvalidArgument("local node id is the broadcast id"));
        }
        // v2 carries node ids in 16 bits, and 0xffff is the broadcast id there.
        if self.wire_version == WireVersion::V2 && self.local_node >= u32::from(NODE_BROADCAST_LEGACY)
        {
            return Err(RouterError::InvalidArgument("local node id does not fit a v2 header"));
        }
        if self.socket_queue == 0 {
            return Err(RouterError::InvalidArgument("socket queue depth must be positive"));
        }
        if self.node_backlog == 0 {
            return Err(RouterError::InvalidArgument("node backlog must be positive"));
        }
        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local_node: DEFAULT_LOCAL_NODE,
            wire_version: WireVersion::V1,
            socket_queue: DEFAULT_SOCKET_QUEUE,
            node_backlog: DEFAULT_NODE_BACKLOG,
        }
    }
}
