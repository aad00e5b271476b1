//! Protocol constants and enumerations for the router wire format.

use crate::error::PacketError;

/// Size of the version 1 header: eight little-endian `u32` fields.
pub const HEADER_V1_SIZE: usize = 32;

/// Size of the fixed part of the version 2 header (options follow).
pub const HEADER_V2_SIZE: usize = 16;

/// Smallest number of bytes needed to learn a frame's size.
pub const HEADER_MINSIZE: usize = HEADER_V2_SIZE;

/// Size of every control packet payload (`cmd` plus the largest record).
pub const CTRL_PKT_SIZE: usize = 20;

/// Bit 0 of the v2 flag byte requests a RESUME_TX from the receiver.
pub const FLAG_CONFIRM_RX: u8 = 0x01;

/// Node id addressing every node.
pub const NODE_BROADCAST: u32 = 0xffff_ffff;

/// Sentinel for a node whose id has not been learned yet.
///
/// Never valid on the wire as a source; shares its value with
/// [`NODE_BROADCAST`] the same way the router's peers do.
pub const NODE_UNASSIGNED: u32 = 0xffff_ffff;

/// Port of the control (name-service) socket.
pub const PORT_CTRL: u32 = 0xffff_fffe;

/// 16-bit rendering of [`PORT_CTRL`] in version 2 headers.
pub const PORT_CTRL_LEGACY: u16 = 0xffff;

/// 16-bit rendering of [`NODE_BROADCAST`] in version 2 headers.
pub const NODE_BROADCAST_LEGACY: u16 = 0xffff;

/// First port handed out by ephemeral allocation.
pub const MIN_EPHEMERAL_PORT: u32 = 0x4000;

/// Last port handed out by ephemeral allocation.
pub const MAX_EPHEMERAL_PORT: u32 = 0x7fff;

/// Marker carried in the reserved word of a DEL_PROC record.
pub const DEL_PROC_MARKER: u32 = 0xffff_ffff;

/// Header layout, selected by the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WireVersion {
    /// Fixed 32-bit-field header.
    #[default]
    V1 = 1,
    /// Compact header with 16-bit addresses and optional trailer.
    V2 = 3,
}

impl WireVersion {
    pub fn from_u8(v: u8) -> Result<Self, PacketError> {
        match v {
            1 => Ok(WireVersion::V1),
            3 => Ok(WireVersion::V2),
            _ => Err(PacketError::UnknownVersion(v)),
        }
    }

    /// Length of the fixed header for this version.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            WireVersion::V1 => HEADER_V1_SIZE,
            WireVersion::V2 => HEADER_V2_SIZE,
        }
    }
}

/// Message type carried in every header.
///
/// Everything but [`PacketType::Data`] is a control packet whose payload is
/// a [`crate::ControlPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    Data = 1,
    Hello = 2,
    Bye = 3,
    NewServer = 4,
    DelServer = 5,
    DelClient = 6,
    ResumeTx = 7,
    Exit = 8,
    Ping = 9,
    NewLookup = 10,
    DelLookup = 11,
    DelProc = 13,
}

impl TryFrom<u32> for PacketType {
    type Error = PacketError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(PacketType::Data),
            2 => Ok(PacketType::Hello),
            3 => Ok(PacketType::Bye),
            4 => Ok(PacketType::NewServer),
            5 => Ok(PacketType::DelServer),
            6 => Ok(PacketType::DelClient),
            7 => Ok(PacketType::ResumeTx),
            8 => Ok(PacketType::Exit),
            9 => Ok(PacketType::Ping),
            10 => Ok(PacketType::NewLookup),
            11 => Ok(PacketType::DelLookup),
            13 => Ok(PacketType::DelProc),
            _ => Err(PacketError::InvalidPacketType(v)),
        }
    }
}

impl PacketType {
    #[must_use = "returns the encoded value without side effects"]
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    /// Whether this is a control-plane type.
    #[must_use]
    pub const fn is_control(self) -> bool {
        !matches!(self, PacketType::Data)
    }
}
