//! Error types for the ipcr-core crate.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    TooShort { min: usize, actual: usize },
    UnknownVersion(u8),
    InvalidPacketType(u32),
    LengthMismatch { expected: usize, actual: usize },
    EmptyPayload,
    AddressOutOfRange(u32),
    BadChecksum { expected: u16, actual: u16 },
    InvalidControl(u32),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::TooShort { min, actual } => {
                write!(f, "frame too short: need at least {min} bytes, got {actual}")
            }
            PacketError::UnknownVersion(v) => write!(f, "unknown header version: {v}"),
            PacketError::InvalidPacketType(v) => write!(f, "invalid packet type: {v}"),
            PacketError::LengthMismatch { expected, actual } => {
                write!(f, "frame length mismatch: header implies {expected} bytes, got {actual}")
            }
            PacketError::EmptyPayload => write!(f, "frame has an empty payload"),
            PacketError::AddressOutOfRange(v) => {
                write!(f, "address 0x{v:x} does not fit a 16-bit header field")
            }
            PacketError::BadChecksum { expected, actual } => {
                write!(f, "bad checksum: expected 0x{expected:04x}, got 0x{actual:04x}")
            }
            PacketError::InvalidControl(cmd) => write!(f, "invalid control packet: cmd {cmd}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PacketError {}

#[cfg(test)]
mod tests {
    extern crate alloc;
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_variants() {
        let err = PacketError::TooShort { min: 32, actual: 4 };
        assert_eq!(err.to_string(), "frame too short: need at least 32 bytes, got 4");

        let err = PacketError::UnknownVersion(7);
        assert_eq!(err.to_string(), "unknown header version: 7");

        let err = PacketError::AddressOutOfRange(0x1_0000);
        assert_eq!(err.to_string(), "address 0x10000 does not fit a 16-bit header field");

        let err = PacketError::BadChecksum {
            expected: 0x1234,
            actual: 0,
        };
        assert_eq!(err.to_string(), "bad checksum: expected 0x1234, got 0x0000");
    }
}
