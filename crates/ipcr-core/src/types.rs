//! Socket addressing.

use core::fmt;

use crate::constants::{NODE_BROADCAST, PORT_CTRL};

/// A (node, port) pair naming a socket anywhere in the router mesh.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SockAddr {
    pub node: u32,
    pub port: u32,
}

impl SockAddr {
    pub const fn new(node: u32, port: u32) -> Self {
        Self { node, port }
    }

    /// The control socket of `node`.
    pub const fn ctrl(node: u32) -> Self {
        Self {
            node,
            port: PORT_CTRL,
        }
    }

    /// The control port of every node.
    pub const fn broadcast_ctrl() -> Self {
        Self::ctrl(NODE_BROADCAST)
    }

    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        self.node == NODE_BROADCAST
    }

    #[must_use]
    pub const fn is_ctrl(&self) -> bool {
        self.port == PORT_CTRL
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.node == NODE_BROADCAST, self.port == PORT_CTRL) {
            (true, true) => write!(f, "bcast:ctrl"),
            (true, false) => write!(f, "bcast:{}", self.port),
            (false, true) => write!(f, "{}:ctrl", self.node),
            (false, false) => write!(f, "{}:{}", self.node, self.port),
        }
    }
}

impl fmt::Debug for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SockAddr({self})")
    }
}
