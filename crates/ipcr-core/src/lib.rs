//! Core types, constants, and wire formats for the IPC router.
//!
//! This crate defines socket addressing, the two router header formats,
//! control packet payloads, and frame-size peeking used by stream transports.
//! It performs no I/O and holds no state.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod packet;
pub mod types;

pub use constants::{NODE_BROADCAST, NODE_UNASSIGNED, PORT_CTRL, PacketType, WireVersion};
pub use error::PacketError;
pub use packet::control::{ClientRecord, ControlPacket, ServerRecord};
pub use packet::wire::{
    DecodedFrame, FrameLayout, Header, decode, encode, peek_frame_layout, peek_frame_size,
};
pub use types::SockAddr;
