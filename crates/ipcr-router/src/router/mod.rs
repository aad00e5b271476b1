//! The router: entry points composing the node registry, the port table and
//! per-node flow control.
//!
//! Outbound traffic takes one of three enqueue paths:
//! - local: straight into a bound socket's receive queue,
//! - node: framed and handed to one node's endpoint under its transmission lock,
//! - broadcast: a copy to every assigned node, then local.

mod config;
mod dispatch;
mod socket;

pub use config::{DEFAULT_LOCAL_NODE, DEFAULT_NODE_BACKLOG, DEFAULT_SOCKET_QUEUE, RouterConfig};
pub use socket::{PeerState, Socket};

use std::fmt;
use std::sync::Arc;

use ipcr_core::{ControlPacket, NODE_BROADCAST, PORT_CTRL, PacketType, SockAddr};
use tracing::{debug, info, trace};

use crate::endpoint::Endpoint;
use crate::error::RouterError;
use crate::forward::must_forward;
use crate::message::Message;
use crate::node::{Node, NodeHandle, NodeRegistry};
use crate::ports::PortTable;
use socket::SocketShared;

/// Who is pushing a message towards a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A local socket; DATA takes flow-control credit.
    Local { nonblocking: bool },
    /// A relayed message; keeps the confirm flag it arrived with.
    Forwarded,
}

struct RouterInner {
    config: RouterConfig,
    nodes: NodeRegistry,
    ports: PortTable<SocketShared>,
}

/// Handle to one router instance. Clones share the same tables.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Result<Self, RouterError> {
        config.validate()?;
        info!(
            local_node = config.local_node,
            wire_version = ?config.wire_version,
            "router created"
        );
        Ok(Self {
            inner: Arc::new(RouterInner {
                config,
                nodes: NodeRegistry::new(),
                ports: PortTable::new(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn local_node(&self) -> u32 {
        self.inner.config.local_node
    }

    /// Number of registered endpoints.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Number of bound local ports.
    #[must_use]
    pub fn bound_ports(&self) -> usize {
        self.inner.ports.len()
    }

    /// Registration currently answering for `nid`.
    #[must_use]
    pub fn lookup_node(&self, nid: u32) -> Option<NodeHandle> {
        self.inner.nodes.lookup(nid).map(|node| NodeHandle { node })
    }

    /// Attach a transport endpoint on segment `net_id`. The node's id is
    /// learned from the first frame it delivers.
    pub fn register_endpoint(
        &self,
        endpoint: Arc<dyn Endpoint>,
        net_id: u32,
    ) -> Result<NodeHandle, RouterError> {
        if !endpoint.can_transmit() {
            return Err(RouterError::InvalidArgument("endpoint cannot transmit"));
        }
        let node = Arc::new(Node::new(endpoint, net_id, self.inner.config.node_backlog));
        self.inner.nodes.add(Arc::clone(&node));
        info!(endpoint = node.name(), net_id, "endpoint registered");
        Ok(NodeHandle { node })
    }

    /// Attach an endpoint whose node id is known up front.
    pub fn register_endpoint_as(
        &self,
        endpoint: Arc<dyn Endpoint>,
        net_id: u32,
        node_id: u32,
    ) -> Result<NodeHandle, RouterError> {
        if node_id == NODE_BROADCAST || node_id == self.local_node() {
            return Err(RouterError::InvalidArgument("node id not assignable"));
        }
        if self.inner.nodes.lookup(node_id).is_some() {
            return Err(RouterError::InvalidArgument("node id already registered"));
        }
        let handle = self.register_endpoint(endpoint, net_id)?;
        self.inner.nodes.assign(&handle.node, node_id);
        Ok(handle)
    }

    /// Tear down a registration.
    ///
    /// Every sender blocked on the node's flow control fails with
    /// [`RouterError::PeerGone`] as soon as the endpoint is cleared. The local
    /// control socket then hears one BYE per id the node answered for, and
    /// distant segments are sent a DEL_PROC, each from its own task so a
    /// stalled recipient delays only its own copy.
    pub async fn unregister_endpoint(&self, handle: &NodeHandle) {
        let node = &handle.node;
        if !node.detach().await {
            return;
        }
        node.flows.wake_all();
        let local = self.local_node();

        let ids = self.inner.nodes.ids_of(node);
        self.inner.nodes.remove(node);
        for &id in &ids {
            let bye = Message::control(ControlPacket::Bye, SockAddr::ctrl(id), SockAddr::ctrl(local));
            if let Err(e) = self.local_enqueue(bye, None) {
                debug!(node = id, error = %e, "BYE not delivered");
            }
        }

        if let Some(nid) = node.nid() {
            for other in self.inner.nodes.snapshot() {
                if !must_forward(Some(node), Some(&other), PacketType::DelProc) {
                    continue;
                }
                let Some(dst) = other.nid() else { continue };
                let msg = Message::control(
                    ControlPacket::DelProc { node: nid },
                    SockAddr::ctrl(nid),
                    SockAddr::ctrl(dst),
                );
                let router = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = router.node_enqueue(&other, msg, Origin::Forwarded).await {
                        debug!(node = dst, error = %e, "DEL_PROC not forwarded");
                    }
                });
            }
        }

        info!(endpoint = node.name(), node = ?node.nid(), "endpoint unregistered");
    }

    /// Deliver into a bound local socket. `sender` is never delivered to.
    pub(crate) fn local_enqueue(
        &self,
        msg: Message,
        sender: Option<&Arc<SocketShared>>,
    ) -> Result<(), RouterError> {
        let Some(sock) = self.inner.ports.lookup(msg.dst.port) else {
            if msg.dst.port == PORT_CTRL {
                trace!(kind = ?msg.kind, "no control socket bound, dropping");
                return Ok(());
            }
            return Err(RouterError::UnknownDestination);
        };
        if sender.is_some_and(|s| Arc::ptr_eq(s, &sock)) {
            return Err(RouterError::UnknownDestination);
        }
        sock.push(msg)
    }

    /// Copy `msg` to every assigned node, then deliver it locally.
    ///
    /// Per-recipient failures are logged and never abort the fan-out.
    pub(crate) async fn broadcast_enqueue(
        &self,
        msg: Message,
        sender: Option<&Arc<SocketShared>>,
        origin: Origin,
    ) {
        for node in self.inner.nodes.snapshot() {
            let Some(nid) = node.nid() else { continue };
            if let Err(e) = self.node_enqueue(&node, msg.clone(), origin).await {
                debug!(node = nid, kind = ?msg.kind, error = %e, "broadcast copy dropped");
            }
        }
        let kind = msg.kind;
        if let Err(e) = self.local_enqueue(msg, sender) {
            debug!(kind = ?kind, error = %e, "broadcast not delivered locally");
        }
    }

    /// Frame `msg` and hand it to `node`'s endpoint.
    pub(crate) async fn node_enqueue(
        &self,
        node: &Arc<Node>,
        mut msg: Message,
        origin: Origin,
    ) -> Result<(), RouterError> {
        if !node.is_connected() || (msg.kind != PacketType::Hello && !node.hello_sent()) {
            debug!(endpoint = node.name(), kind = ?msg.kind, "node not ready, dropping");
            return Err(RouterError::UnknownDestination);
        }

        let key = (msg.dst.node, msg.dst.port);
        if let Origin::Local { nonblocking } = origin {
            msg.confirm_rx = node
                .flows
                .wait(key, msg.kind, nonblocking, || !node.is_connected())
                .await?;
        }
        if msg.dst.node == NODE_BROADCAST
            && let Some(nid) = node.nid()
        {
            msg.dst.node = nid;
        }

        let result = match ipcr_core::encode(&msg.header(self.inner.config.wire_version), &msg.payload)
        {
            Ok(frame) => {
                let ep = node.endpoint().await;
                match &*ep {
                    Some(ep) => ep.transmit(frame).await.map_err(RouterError::from),
                    None => Err(RouterError::PeerGone),
                }
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                if msg.kind == PacketType::Hello {
                    node.set_hello_sent();
                }
                trace!(
                    src = %msg.src,
                    dst = %msg.dst,
                    kind = ?msg.kind,
                    confirm = msg.confirm_rx,
                    "frame transmitted"
                );
                Ok(())
            }
            Err(e) => {
                if msg.confirm_rx {
                    node.flows.mark_failed(key);
                }
                debug!(endpoint = node.name(), dst = %msg.dst, error = %e, "transmit failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("local_node", &self.local_node())
            .field("nodes", &self.node_count())
            .field("ports", &self.bound_ports())
            .finish()
    }
}
