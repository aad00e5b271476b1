//! Inbound frame handling.

use std::sync::Arc;

use ipcr_core::constants::CTRL_PKT_SIZE;
use ipcr_core::{ControlPacket, NODE_BROADCAST, PORT_CTRL, PacketError, PacketType, SockAddr};
use tracing::{debug, trace, warn};

use super::{Origin, Router};
use crate::error::RouterError;
use crate::forward::must_forward;
use crate::message::Message;
use crate::node::{Node, NodeHandle};

/// Validate a raw frame and lift it into a [`Message`].
fn accept(raw: &[u8]) -> Result<Message, RouterError> {
    let frame = ipcr_core::decode(raw)?;
    let kind = frame.header.kind;

    if frame.header.dst.port != PORT_CTRL && !matches!(kind, PacketType::Data | PacketType::ResumeTx)
    {
        return Err(RouterError::InvalidArgument(
            "control packet not addressed to the control port",
        ));
    }

    if matches!(
        kind,
        PacketType::NewServer | PacketType::ResumeTx | PacketType::DelProc
    ) {
        if frame.payload.len() < CTRL_PKT_SIZE {
            return Err(PacketError::TooShort {
                min: CTRL_PKT_SIZE,
                actual: frame.payload.len(),
            }
            .into());
        }
        let pkt = ControlPacket::decode(frame.payload)?;
        if pkt.kind() != kind {
            return Err(PacketError::InvalidControl(pkt.kind().to_u32()).into());
        }
    }

    Ok(Message::from_frame(&frame))
}

impl Router {
    /// Hand one raw frame received on `handle`'s endpoint to the router.
    ///
    /// Errors describe this frame only: malformed frames are dropped and
    /// reported here, while routing failures of accepted frames are logged.
    pub async fn deliver(&self, handle: &NodeHandle, raw: &[u8]) -> Result<(), RouterError> {
        let node = &handle.node;
        if !node.is_connected() {
            return Err(RouterError::PeerGone);
        }

        let msg = accept(raw).inspect_err(|e| {
            warn!(endpoint = node.name(), len = raw.len(), error = %e, "dropping inbound frame");
        })?;

        let local = self.local_node();
        if msg.src.node != local {
            self.inner.nodes.assign(node, msg.src.node);
        }
        // A node announcing a server elsewhere is the route to that server.
        if msg.kind == PacketType::NewServer
            && let Ok(ControlPacket::NewServer(server)) = msg.control_packet()
            && server.node != local
        {
            self.inner.nodes.assign(node, server.node);
        }

        node.push_inbound(msg).inspect_err(|_| {
            warn!(endpoint = node.name(), "inbound backlog full, dropping frame");
        })?;
        self.drain(node).await;
        Ok(())
    }

    /// Process `node`'s backlog unless another caller already is.
    async fn drain(&self, node: &Arc<Node>) {
        loop {
            {
                let Ok(_guard) = node.drain.try_lock() else {
                    return;
                };
                while let Some(msg) = node.pop_inbound() {
                    self.route_inbound(node, msg).await;
                }
            }
            // A frame pushed while we held the lock but after our last pop
            // would otherwise sit until the next delivery.
            if !node.has_inbound() {
                return;
            }
        }
    }

    async fn route_inbound(&self, node: &Arc<Node>, msg: Message) {
        let local = self.local_node();
        trace!(src = %msg.src, dst = %msg.dst, kind = ?msg.kind, "inbound");

        match msg.kind {
            PacketType::Data => {
                if msg.dst.node != local && msg.dst.node != NODE_BROADCAST {
                    self.relay(msg).await;
                } else {
                    self.deliver_local(msg);
                }
            }
            PacketType::ResumeTx => {
                if msg.dst.node != local && msg.dst.node != NODE_BROADCAST {
                    self.relay(msg).await;
                } else if let Ok(ControlPacket::ResumeTx(client)) = msg.control_packet() {
                    trace!(node = client.node, port = client.port, "resume tx");
                    node.flows.resume(client);
                }
            }
            PacketType::Hello | PacketType::Bye => self.deliver_local(msg),
            PacketType::DelProc => {
                self.forward_control(&msg).await;
                if let Ok(ControlPacket::DelProc { node: gone }) = msg.control_packet() {
                    let bye = Message::control(
                        ControlPacket::Bye,
                        SockAddr::ctrl(gone),
                        SockAddr::ctrl(local),
                    );
                    self.deliver_local(bye);
                }
            }
            _ => {
                self.forward_control(&msg).await;
                self.deliver_local(msg);
            }
        }
    }

    fn deliver_local(&self, msg: Message) {
        let (dst, kind) = (msg.dst, msg.kind);
        if let Err(e) = self.local_enqueue(msg, None) {
            debug!(dst = %dst, kind = ?kind, error = %e, "local delivery failed");
        }
    }

    /// Point-to-point relay towards a node this router is not.
    async fn relay(&self, msg: Message) {
        let dst = msg.dst;
        let Some(target) = self.inner.nodes.lookup(dst.node) else {
            debug!(dst = %dst, error = %RouterError::UnknownDestination, "relay failed");
            return;
        };
        if let Err(e) = self.node_enqueue(&target, msg, Origin::Forwarded).await {
            debug!(dst = %dst, error = %e, "relay failed");
        }
    }

    /// Copy a control packet to every node more than one segment away from
    /// its source.
    async fn forward_control(&self, msg: &Message) {
        let src = self.inner.nodes.lookup(msg.src.node);
        for node in self.inner.nodes.snapshot() {
            if !must_forward(src.as_ref(), Some(&node), msg.kind) {
                continue;
            }
            let Some(nid) = node.nid() else { continue };
            let mut fwd = msg.clone();
            fwd.dst = SockAddr::ctrl(nid);
            if let Err(e) = self.node_enqueue(&node, fwd, Origin::Forwarded).await {
                debug!(node = nid, kind = ?msg.kind, error = %e, "control forward dropped");
            }
        }
    }
}
