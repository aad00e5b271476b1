//! Frame headers and control payloads.

pub mod control;
pub mod wire;
