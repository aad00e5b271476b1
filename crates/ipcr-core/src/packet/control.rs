//! Control packet payloads.
//!
//! Every control packet is a fixed 20-byte little-endian structure:
//!
//! ```text
//! cmd u32 | record (16 bytes)
//!
//! server record: service u32 | instance u32 | node u32 | port u32
//! client record: node u32 | port u32 | 0 | 0
//! proc record:   marker u32 | node u32 | checksum u16 | 0 u16 | 0
//! ```
//!
//! The proc checksum is the ones'-complement fold of the 20-byte payload
//! taken with the checksum word zeroed.

use crate::constants::{CTRL_PKT_SIZE, DEL_PROC_MARKER, PacketType};
use crate::error::PacketError;
use crate::types::SockAddr;

const RECORD_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = 12;

/// Service announcement: which (node, port) serves (service, instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ServerRecord {
    pub service: u32,
    pub instance: u32,
    pub node: u32,
    pub port: u32,
}

impl ServerRecord {
    #[must_use]
    pub fn addr(&self) -> SockAddr {
        SockAddr::new(self.node, self.port)
    }
}

/// A socket address carried by DEL_CLIENT and RESUME_TX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientRecord {
    pub node: u32,
    pub port: u32,
}

impl ClientRecord {
    #[must_use]
    pub fn addr(&self) -> SockAddr {
        SockAddr::new(self.node, self.port)
    }
}

impl From<SockAddr> for ClientRecord {
    fn from(addr: SockAddr) -> Self {
        Self {
            node: addr.node,
            port: addr.port,
        }
    }
}

/// A decoded control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPacket {
    Hello,
    Bye,
    NewServer(ServerRecord),
    DelServer(ServerRecord),
    DelClient(ClientRecord),
    ResumeTx(ClientRecord),
    Exit,
    Ping,
    NewLookup(ServerRecord),
    DelLookup(ServerRecord),
    /// A processor behind `node` went away.
    DelProc { node: u32 },
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn need(payload: &[u8], min: usize) -> Result<(), PacketError> {
    if payload.len() < min {
        return Err(PacketError::TooShort {
            min,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Ones'-complement sum of little-endian 16-bit words, folded and inverted.
///
/// A trailing odd byte counts as the low byte of a final word.
#[must_use]
pub fn ones_complement_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match *chunk {
            [lo, hi] => u16::from_le_bytes([lo, hi]),
            [lo] => u16::from(lo),
            _ => 0,
        };
        sum += u32::from(word);
        sum = (sum & 0xffff) + (sum >> 16);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn proc_checksum(buf: &[u8; CTRL_PKT_SIZE]) -> u16 {
    let mut zeroed = *buf;
    zeroed[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].fill(0);
    ones_complement_checksum(&zeroed)
}

impl ControlPacket {
    /// The header type this payload travels under.
    #[must_use]
    pub fn kind(&self) -> PacketType {
        match self {
            ControlPacket::Hello => PacketType::Hello,
            ControlPacket::Bye => PacketType::Bye,
            ControlPacket::NewServer(_) => PacketType::NewServer,
            ControlPacket::DelServer(_) => PacketType::DelServer,
            ControlPacket::DelClient(_) => PacketType::DelClient,
            ControlPacket::ResumeTx(_) => PacketType::ResumeTx,
            ControlPacket::Exit => PacketType::Exit,
            ControlPacket::Ping => PacketType::Ping,
            ControlPacket::NewLookup(_) => PacketType::NewLookup,
            ControlPacket::DelLookup(_) => PacketType::DelLookup,
            ControlPacket::DelProc { .. } => PacketType::DelProc,
        }
    }

    /// Serialize into the fixed-size control payload.
    #[must_use]
    pub fn encode(&self) -> [u8; CTRL_PKT_SIZE] {
        let mut buf = [0u8; CTRL_PKT_SIZE];
        put_u32(&mut buf, 0, self.kind().to_u32());

        match self {
            ControlPacket::NewServer(s)
            | ControlPacket::DelServer(s)
            | ControlPacket::NewLookup(s)
            | ControlPacket::DelLookup(s) => {
                put_u32(&mut buf, RECORD_OFFSET, s.service);
                put_u32(&mut buf, RECORD_OFFSET + 4, s.instance);
                put_u32(&mut buf, RECORD_OFFSET + 8, s.node);
                put_u32(&mut buf, RECORD_OFFSET + 12, s.port);
            }
            ControlPacket::DelClient(c) | ControlPacket::ResumeTx(c) => {
                put_u32(&mut buf, RECORD_OFFSET, c.node);
                put_u32(&mut buf, RECORD_OFFSET + 4, c.port);
            }
            ControlPacket::DelProc { node } => {
                put_u32(&mut buf, RECORD_OFFSET, DEL_PROC_MARKER);
                put_u32(&mut buf, RECORD_OFFSET + 4, *node);
                let sum = proc_checksum(&buf);
                buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_le_bytes());
            }
            ControlPacket::Hello | ControlPacket::Bye | ControlPacket::Exit | ControlPacket::Ping => {}
        }
        buf
    }

    /// Read the leading `cmd` word without decoding the record.
    pub fn peek_cmd(payload: &[u8]) -> Result<PacketType, PacketError> {
        need(payload, 4)?;
        let cmd = get_u32(payload, 0);
        match PacketType::try_from(cmd) {
            Ok(PacketType::Data) | Err(_) => Err(PacketError::InvalidControl(cmd)),
            Ok(kind) => Ok(kind),
        }
    }

    /// Parse a control payload. Trailing bytes past the record are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        let kind = Self::peek_cmd(payload)?;

        let server = |p: &[u8]| -> Result<ServerRecord, PacketError> {
            need(p, RECORD_OFFSET + 16)?;
            Ok(ServerRecord {
                service: get_u32(p, RECORD_OFFSET),
                instance: get_u32(p, RECORD_OFFSET + 4),
                node: get_u32(p, RECORD_OFFSET + 8),
                port: get_u32(p, RECORD_OFFSET + 12),
            })
        };
        let client = |p: &[u8]| -> Result<ClientRecord, PacketError> {
            need(p, RECORD_OFFSET + 8)?;
            Ok(ClientRecord {
                node: get_u32(p, RECORD_OFFSET),
                port: get_u32(p, RECORD_OFFSET + 4),
            })
        };

        match kind {
            PacketType::Hello => Ok(ControlPacket::Hello),
            PacketType::Bye => Ok(ControlPacket::Bye),
            PacketType::Exit => Ok(ControlPacket::Exit),
            PacketType::Ping => Ok(ControlPacket::Ping),
            PacketType::NewServer => Ok(ControlPacket::NewServer(server(payload)?)),
            PacketType::DelServer => Ok(ControlPacket::DelServer(server(payload)?)),
            PacketType::NewLookup => Ok(ControlPacket::NewLookup(server(payload)?)),
            PacketType::DelLookup => Ok(ControlPacket::DelLookup(server(payload)?)),
            PacketType::DelClient => Ok(ControlPacket::DelClient(client(payload)?)),
            PacketType::ResumeTx => Ok(ControlPacket::ResumeTx(client(payload)?)),
            PacketType::DelProc => {
                need(payload, CTRL_PKT_SIZE)?;
                let mut buf = [0u8; CTRL_PKT_SIZE];
                buf.copy_from_slice(&payload[..CTRL_PKT_SIZE]);
                if get_u32(&buf, RECORD_OFFSET) != DEL_PROC_MARKER {
                    return Err(PacketError::InvalidControl(kind.to_u32()));
                }
                let expected = proc_checksum(&buf);
                let actual = u16::from_le_bytes([buf[CHECKSUM_OFFSET], buf[CHECKSUM_OFFSET + 1]]);
                if expected != actual {
                    return Err(PacketError::BadChecksum { expected, actual });
                }
                Ok(ControlPacket::DelProc {
                    node: get_u32(&buf, RECORD_OFFSET + 4),
                })
            }
            PacketType::Data => Err(PacketError::InvalidControl(kind.to_u32())),
        }
    }
}
