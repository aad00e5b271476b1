//! Cross-segment forwarding decision.

use std::sync::Arc;

use ipcr_core::PacketType;

use crate::node::Node;

/// Whether a control packet that arrived from `src` must be relayed to `dst`.
///
/// Nodes one segment apart already hear each other, so only packets crossing
/// more than one segment boundary are relayed. HELLO and RESUME_TX are
/// strictly point-to-point.
#[must_use]
pub fn must_forward(src: Option<&Arc<Node>>, dst: Option<&Arc<Node>>, kind: PacketType) -> bool {
    let Some(src) = src else {
        return true;
    };
    let Some(dst) = dst else {
        return false;
    };
    if matches!(kind, PacketType::Hello | PacketType::ResumeTx) {
        return false;
    }
    if Arc::ptr_eq(src, dst) || dst.nid().is_none() {
        return false;
    }
    src.net_id().abs_diff(dst.net_id()) > 1
}
