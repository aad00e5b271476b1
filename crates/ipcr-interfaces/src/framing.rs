//! Frame recovery for byte streams.
//!
//! Router frames carry their own size, so a stream needs no delimiters: the
//! accumulator peeks the fixed header, waits for `header + align4(size)`
//! bytes and cuts the frame out. An unrecognised version byte means the
//! stream lost sync; the buffer is discarded and the error reported.
//! The size limit applies to the declared payload, whatever the header
//! version or option length.

use ipcr_core::{PacketError, peek_frame_layout};

use crate::error::InterfaceError;

/// Largest payload a single frame may declare by default.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// Stateful buffer that extracts complete router frames from stream data.
pub struct FrameAccumulator {
    buffer: Vec<u8>,
    max_payload: usize,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_payload,
        }
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Cut the next complete frame out of the buffer.
    ///
    /// `Ok(None)` means more bytes are needed. On error the buffer has been
    /// cleared.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, InterfaceError> {
        let layout = match peek_frame_layout(&self.buffer) {
            Ok(layout) => layout,
            Err(PacketError::TooShort { .. }) => return Ok(None),
            Err(e) => {
                self.buffer.clear();
                return Err(e.into());
            }
        };
        if layout.payload_len > self.max_payload {
            self.buffer.clear();
            return Err(InterfaceError::FrameTooLarge {
                size: layout.payload_len,
                max: self.max_payload,
            });
        }
        let size = layout.frame_len();
        if self.buffer.len() < size {
            return Ok(None);
        }
        let rest = self.buffer.split_off(size);
        Ok(Some(std::mem::replace(&mut self.buffer, rest)))
    }

    /// Bytes held waiting for the rest of a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use ipcr_core::{Header, PacketType, SockAddr, WireVersion, encode};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn any_chunking_recovers_frames(
            lens in prop::collection::vec(1usize..200, 1..8),
            cut in 1usize..64,
        ) {
            let mut stream = Vec::new();
            let mut frames = Vec::new();
            for (i, len) in lens.iter().enumerate() {
                let version = if i % 2 == 0 { WireVersion::V1 } else { WireVersion::V2 };
                let h = Header::new(version, PacketType::Data, SockAddr::new(3, 1), SockAddr::new(4, 2));
                let f = encode(&h, &vec![i as u8; *len]).unwrap();
                stream.extend_from_slice(&f);
                frames.push(f);
            }

            let mut acc = FrameAccumulator::new();
            let mut out = Vec::new();
            for chunk in stream.chunks(cut) {
                acc.extend(chunk);
                while let Some(f) = acc.next_frame().unwrap() {
                    out.push(f);
                }
            }
            prop_assert_eq!(out, frames);
            prop_assert_eq!(acc.buffered(), 0);
        }
    }
}
