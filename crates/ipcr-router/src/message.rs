//! Owned routed messages.

use ipcr_core::{ControlPacket, DecodedFrame, Header, PacketType, SockAddr, WireVersion};

use crate::error::RouterError;

/// A message travelling through the router.
///
/// Decoded header fields plus an owned, unpadded payload. Broadcast paths
/// clone it once per recipient; nothing mutates it after hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: PacketType,
    pub src: SockAddr,
    pub dst: SockAddr,
    /// Sender asked for a RESUME_TX once this message is consumed.
    pub confirm_rx: bool,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn data(src: SockAddr, dst: SockAddr, payload: Vec<u8>) -> Self {
        Self {
            kind: PacketType::Data,
            src,
            dst,
            confirm_rx: false,
            payload,
        }
    }

    /// Wrap a control packet; the header type follows the packet.
    pub fn control(pkt: ControlPacket, src: SockAddr, dst: SockAddr) -> Self {
        Self {
            kind: pkt.kind(),
            src,
            dst,
            confirm_rx: false,
            payload: pkt.encode().to_vec(),
        }
    }

    pub fn from_frame(frame: &DecodedFrame<'_>) -> Self {
        Self {
            kind: frame.header.kind,
            src: frame.header.src,
            dst: frame.header.dst,
            confirm_rx: frame.header.confirm_rx,
            payload: frame.payload.to_vec(),
        }
    }

    /// Header for framing this message with `version`.
    #[must_use]
    pub fn header(&self, version: WireVersion) -> Header {
        Header::new(version, self.kind, self.src, self.dst).with_confirm(self.confirm_rx)
    }

    /// Decode the payload as a control packet.
    pub fn control_packet(&self) -> Result<ControlPacket, ipcr_core::PacketError> {
        ControlPacket::decode(&self.payload)
    }
}

/// Copy a caller's payload into an owned buffer, failing instead of
/// aborting when the allocation cannot be made.
pub(crate) fn copy_payload(payload: &[u8]) -> Result<Vec<u8>, RouterError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(payload.len())?;
    buf.extend_from_slice(payload);
    Ok(buf)
}
