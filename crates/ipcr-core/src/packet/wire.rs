//! Header encoding and decoding for both wire versions.
//!
//! ```text
//! v1 (32 bytes, all fields u32 LE):
//!   version | type | src_node | src_port | confirm_rx | size | dst_node | dst_port
//!
//! v2 (16 bytes + optlen):
//!   version u8 | type u8 | flags u8 | optlen u8 | size u32 |
//!   src_node u16 | src_port u16 | dst_node u16 | dst_port u16 | options[optlen]
//! ```
//!
//! The payload follows the header and is zero-padded to a 4-byte boundary.
//! `size` always carries the unpadded length.

extern crate alloc;
use alloc::vec::Vec;

use crate::constants::{
    FLAG_CONFIRM_RX, HEADER_V1_SIZE, HEADER_V2_SIZE, NODE_BROADCAST, NODE_BROADCAST_LEGACY,
    PORT_CTRL, PORT_CTRL_LEGACY, PacketType, WireVersion,
};
use crate::error::PacketError;
use crate::types::SockAddr;

/// Decoded header fields common to both versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: WireVersion,
    pub kind: PacketType,
    pub src: SockAddr,
    pub dst: SockAddr,
    pub confirm_rx: bool,
}

impl Header {
    pub fn new(version: WireVersion, kind: PacketType, src: SockAddr, dst: SockAddr) -> Self {
        Self {
            version,
            kind,
            src,
            dst,
            confirm_rx: false,
        }
    }

    #[must_use]
    pub fn with_confirm(mut self, confirm_rx: bool) -> Self {
        self.confirm_rx = confirm_rx;
        self
    }
}

/// A frame decoded in place: the header plus a borrow of the unpadded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub header: Header,
    /// Header length including any v2 options; also the payload offset.
    pub header_len: usize,
    pub payload: &'a [u8],
}

impl DecodedFrame<'_> {
    #[must_use]
    pub fn payload_offset(&self) -> usize {
        self.header_len
    }

    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Round `len` up to the next multiple of four.
#[must_use]
pub const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u32(raw: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&raw[off..off + 4]);
    u32::from_le_bytes(b)
}

fn read_u16(raw: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([raw[off], raw[off + 1]])
}

fn node_from_v2(v: u16) -> u32 {
    if v == NODE_BROADCAST_LEGACY {
        NODE_BROADCAST
    } else {
        u32::from(v)
    }
}

fn port_from_v2(v: u16) -> u32 {
    if v == PORT_CTRL_LEGACY {
        PORT_CTRL
    } else {
        u32::from(v)
    }
}

fn node_to_v2(v: u32) -> Result<u16, PacketError> {
    if v == NODE_BROADCAST {
        return Ok(NODE_BROADCAST_LEGACY);
    }
    match u16::try_from(v) {
        Ok(n) if n != NODE_BROADCAST_LEGACY => Ok(n),
        _ => Err(PacketError::AddressOutOfRange(v)),
    }
}

fn port_to_v2(v: u32) -> Result<u16, PacketError> {
    if v == PORT_CTRL {
        return Ok(PORT_CTRL_LEGACY);
    }
    match u16::try_from(v) {
        Ok(p) if p != PORT_CTRL_LEGACY => Ok(p),
        _ => Err(PacketError::AddressOutOfRange(v)),
    }
}

fn require(raw: &[u8], min: usize) -> Result<(), PacketError> {
    if raw.len() < min {
        return Err(PacketError::TooShort {
            min,
            actual: raw.len(),
        });
    }
    Ok(())
}

/// Parse the header fields, returning the header, its length and the declared size.
fn decode_header(raw: &[u8]) -> Result<(Header, usize, usize), PacketError> {
    let first = *raw.first().ok_or(PacketError::TooShort {
        min: HEADER_V2_SIZE,
        actual: 0,
    })?;

    match WireVersion::from_u8(first)? {
        WireVersion::V1 => {
            require(raw, HEADER_V1_SIZE)?;
            let kind = PacketType::try_from(read_u32(raw, 4))?;
            let header = Header {
                version: WireVersion::V1,
                kind,
                src: SockAddr::new(read_u32(raw, 8), read_u32(raw, 12)),
                confirm_rx: read_u32(raw, 16) != 0,
                dst: SockAddr::new(read_u32(raw, 24), read_u32(raw, 28)),
            };
            Ok((header, HEADER_V1_SIZE, read_u32(raw, 20) as usize))
        }
        WireVersion::V2 => {
            require(raw, HEADER_V2_SIZE)?;
            let kind = PacketType::try_from(u32::from(raw[1]))?;
            let header_len = HEADER_V2_SIZE + usize::from(raw[3]);
            require(raw, header_len)?;
            let header = Header {
                version: WireVersion::V2,
                kind,
                src: SockAddr::new(node_from_v2(read_u16(raw, 8)), port_from_v2(read_u16(raw, 10))),
                dst: SockAddr::new(
                    node_from_v2(read_u16(raw, 12)),
                    port_from_v2(read_u16(raw, 14)),
                ),
                confirm_rx: raw[2] & FLAG_CONFIRM_RX != 0,
            };
            Ok((header, header_len, read_u32(raw, 4) as usize))
        }
    }
}

/// Decode a complete frame.
///
/// The buffer must hold exactly one frame: header, options, and the payload
/// padded to a 4-byte boundary.
pub fn decode(raw: &[u8]) -> Result<DecodedFrame<'_>, PacketError> {
    let (header, header_len, size) = decode_header(raw)?;
    if size == 0 {
        return Err(PacketError::EmptyPayload);
    }

    let expected = header_len.saturating_add(align4(size));
    if raw.len() != expected {
        return Err(PacketError::LengthMismatch {
            expected,
            actual: raw.len(),
        });
    }

    Ok(DecodedFrame {
        header,
        header_len,
        payload: &raw[header_len..header_len + size],
    })
}

/// Encode a header and payload into a padded frame.
///
/// Frames always carry at least one payload byte; an empty payload is
/// refused here as it is by [`decode`].
pub fn encode(header: &Header, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.is_empty() {
        return Err(PacketError::EmptyPayload);
    }
    let size = u32::try_from(payload.len()).map_err(|_| PacketError::LengthMismatch {
        expected: u32::MAX as usize,
        actual: payload.len(),
    })?;
    let header_len = header.version.header_size();
    let mut out = Vec::with_capacity(header_len + align4(payload.len()));

    match header.version {
        WireVersion::V1 => {
            for word in [
                WireVersion::V1 as u32,
                header.kind.to_u32(),
                header.src.node,
                header.src.port,
                u32::from(header.confirm_rx),
                size,
                header.dst.node,
                header.dst.port,
            ] {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
        WireVersion::V2 => {
            let kind = u8::try_from(header.kind.to_u32())
                .map_err(|_| PacketError::InvalidPacketType(header.kind.to_u32()))?;
            let flags = if header.confirm_rx { FLAG_CONFIRM_RX } else { 0 };
            out.extend_from_slice(&[WireVersion::V2 as u8, kind, flags, 0]);
            out.extend_from_slice(&size.to_le_bytes());
            for half in [
                node_to_v2(header.src.node)?,
                port_to_v2(header.src.port)?,
                node_to_v2(header.dst.node)?,
                port_to_v2(header.dst.port)?,
            ] {
                out.extend_from_slice(&half.to_le_bytes());
            }
        }
    }

    out.extend_from_slice(payload);
    out.resize(header_len + align4(payload.len()), 0);
    Ok(out)
}

/// Lengths a frame declares in its fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Fixed header plus any v2 options.
    pub header_len: usize,
    /// Payload bytes before padding.
    pub payload_len: usize,
}

impl FrameLayout {
    /// Bytes the whole frame occupies on the wire, padding included.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.header_len + align4(self.payload_len)
    }
}

/// Layout of the frame starting at `raw[0]`, from its fixed header alone.
pub fn peek_frame_layout(raw: &[u8]) -> Result<FrameLayout, PacketError> {
    let first = *raw.first().ok_or(PacketError::TooShort {
        min: HEADER_V2_SIZE,
        actual: 0,
    })?;

    match WireVersion::from_u8(first)? {
        WireVersion::V1 => {
            require(raw, HEADER_V1_SIZE)?;
            Ok(FrameLayout {
                header_len: HEADER_V1_SIZE,
                payload_len: read_u32(raw, 20) as usize,
            })
        }
        WireVersion::V2 => {
            require(raw, HEADER_V2_SIZE)?;
            Ok(FrameLayout {
                header_len: HEADER_V2_SIZE + usize::from(raw[3]),
                payload_len: read_u32(raw, 4) as usize,
            })
        }
    }
}

/// Total length of the frame starting at `raw[0]`, from its header alone.
///
/// Stream transports call this to find frame boundaries before a whole
/// frame has been buffered.
pub fn peek_frame_size(raw: &[u8]) -> Result<usize, PacketError> {
    peek_frame_layout(raw).map(|layout| layout.frame_len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_header(version: WireVersion) -> Header {
        Header::new(
            version,
            PacketType::Data,
            SockAddr::new(1, 0x4000),
            SockAddr::new(2, 0x4001),
        )
    }

    #[test]
    fn v1_wire_layout() {
        let raw = encode(&data_header(WireVersion::V1), b"abcd").unwrap();
        let expected = hex::decode(concat!(
            "01000000", "01000000", "01000000", "00400000",
            "00000000", "04000000", "02000000", "01400000",
            "61626364"
        ))
        .unwrap();
        assert_eq!(raw, expected);
    }

    #[test]
    fn v2_wire_layout() {
        let raw = encode(&data_header(WireVersion::V2).with_confirm(true), b"abcd").unwrap();
        let expected =
            hex::decode(concat!("03010100", "04000000", "0100", "0040", "0200", "0140", "61626364"))
                .unwrap();
        assert_eq!(raw, expected);
    }

    #[test]
    fn payload_is_padded_but_size_is_not() {
        let raw = encode(&data_header(WireVersion::V1), b"hello").unwrap();
        assert_eq!(raw.len(), HEADER_V1_SIZE + 8);
        assert_eq!(read_u32(&raw, 20), 5);
        assert_eq!(&raw[HEADER_V1_SIZE + 5..], &[0, 0, 0]);

        let frame = decode(&raw).unwrap();
        assert_eq!(frame.payload, b"hello");
        assert_eq!(frame.payload_offset(), HEADER_V1_SIZE);
        assert_eq!(frame.payload_len(), 5);
    }

    #[test]
    fn v2_ctrl_port_uses_legacy_sentinel() {
        let header = Header::new(
            WireVersion::V2,
            PacketType::Hello,
            SockAddr::ctrl(5),
            SockAddr::ctrl(1),
        );
        let raw = encode(&header, &[0u8; 20]).unwrap();
        assert_eq!(read_u16(&raw, 10), 0xffff);
        assert_eq!(read_u16(&raw, 14), 0xffff);

        let frame = decode(&raw).unwrap();
        assert_eq!(frame.header.src.port, PORT_CTRL);
        assert_eq!(frame.header.dst.port, PORT_CTRL);
    }

    #[test]
    fn v2_low_bits_of_ctrl_port_are_not_ctrl() {
        // 0x0000fffe shares its low 16 bits with nothing special; it is an ordinary
        // port that still fits the field.
        let header = Header::new(
            WireVersion::V2,
            PacketType::Data,
            SockAddr::new(1, 0xfffe),
            SockAddr::new(2, 0x4000),
        );
        let frame_raw = encode(&header, b"x").unwrap();
        let frame = decode(&frame_raw).unwrap();
        assert_eq!(frame.header.src.port, 0xfffe);
    }

    #[test]
    fn v2_rejects_wide_addresses() {
        let header = Header::new(
            WireVersion::V2,
            PacketType::Data,
            SockAddr::new(0x1_0000, 1),
            SockAddr::new(2, 0x4000),
        );
        assert_eq!(
            encode(&header, b"x"),
            Err(PacketError::AddressOutOfRange(0x1_0000))
        );

        let header = Header::new(
            WireVersion::V2,
            PacketType::Data,
            SockAddr::new(1, 0xffff),
            SockAddr::new(2, 0x4000),
        );
        assert_eq!(encode(&header, b"x"), Err(PacketError::AddressOutOfRange(0xffff)));
    }

    #[test]
    fn v2_options_are_skipped() {
        let mut raw = hex::decode("03010004").unwrap();
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(&hex::decode("0100004002000140").unwrap());
        raw.extend_from_slice(&[0xAA; 4]); // options
        raw.extend_from_slice(b"wxyz");

        let frame = decode(&raw).unwrap();
        assert_eq!(frame.header_len, HEADER_V2_SIZE + 4);
        assert_eq!(frame.payload, b"wxyz");
        assert_eq!(peek_frame_size(&raw).unwrap(), raw.len());
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut raw = encode(&data_header(WireVersion::V1), b"abcd").unwrap();
        raw[0] = 2;
        assert_eq!(decode(&raw), Err(PacketError::UnknownVersion(2)));
        assert_eq!(peek_frame_size(&raw), Err(PacketError::UnknownVersion(2)));
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(matches!(decode(&[]), Err(PacketError::TooShort { .. })));
        assert!(matches!(
            decode(&[1, 0, 0, 0, 1, 0, 0, 0]),
            Err(PacketError::TooShort { min: 32, actual: 8 })
        ));
        assert!(matches!(
            decode(&[3, 1, 0, 0]),
            Err(PacketError::TooShort { min: 16, actual: 4 })
        ));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let raw = encode(&data_header(WireVersion::V1), b"abcdef").unwrap();
        // Truncated padding.
        assert!(matches!(
            decode(&raw[..raw.len() - 1]),
            Err(PacketError::LengthMismatch { .. })
        ));
        // Trailing garbage.
        let mut long = raw.clone();
        long.extend_from_slice(&[0; 4]);
        assert!(matches!(decode(&long), Err(PacketError::LengthMismatch { .. })));
    }

    #[test]
    fn decode_rejects_empty_payload() {
        // A v2 header declaring zero payload bytes and no options.
        let mut raw = encode(&data_header(WireVersion::V2), b"abcd").unwrap();
        raw[4..8].copy_from_slice(&0u32.to_le_bytes());
        raw.truncate(HEADER_V2_SIZE);
        assert_eq!(decode(&raw), Err(PacketError::EmptyPayload));
    }

    #[test]
    fn encode_rejects_empty_payload() {
        for version in [WireVersion::V1, WireVersion::V2] {
            assert_eq!(
                encode(&data_header(version), b""),
                Err(PacketError::EmptyPayload)
            );
        }
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let mut raw = encode(&data_header(WireVersion::V1), b"abcd").unwrap();
        raw[4] = 12;
        assert_eq!(decode(&raw), Err(PacketError::InvalidPacketType(12)));
    }

    #[test]
    fn peek_needs_fixed_header_only() {
        let raw = encode(&data_header(WireVersion::V1), &[7u8; 9]).unwrap();
        assert_eq!(peek_frame_size(&raw[..HEADER_V1_SIZE]).unwrap(), HEADER_V1_SIZE + 12);
        assert!(matches!(
            peek_frame_size(&raw[..10]),
            Err(PacketError::TooShort { .. })
        ));

        let raw = encode(&data_header(WireVersion::V2), &[7u8; 9]).unwrap();
        assert_eq!(peek_frame_size(&raw[..HEADER_V2_SIZE]).unwrap(), HEADER_V2_SIZE + 12);
    }

    #[test]
    fn layout_counts_v2_options_in_header() {
        let plain = encode(&data_header(WireVersion::V2), &[1u8; 6]).unwrap();
        let mut raw = plain[..HEADER_V2_SIZE].to_vec();
        raw[3] = 8;
        raw.extend_from_slice(&[0u8; 8]);
        raw.extend_from_slice(&plain[HEADER_V2_SIZE..]);
        let layout = peek_frame_layout(&raw).unwrap();
        assert_eq!(
            layout,
            FrameLayout {
                header_len: HEADER_V2_SIZE + 8,
                payload_len: 6
            }
        );
        assert_eq!(layout.frame_len(), raw.len());
        assert_eq!(peek_frame_size(&raw).unwrap(), raw.len());
    }

    #[test]
    fn align4_boundaries() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }
}
