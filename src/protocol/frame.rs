//! Frame struct with typed accessors.
//!
//! A frame is one command byte followed by its payload. The payload length
//! is not on the wire; it comes from the session's [`PayloadSizeTable`].
//!
//! # Example
//!
//! ```
//! use slp_relay::protocol::{Frame, GAME_END};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(GAME_END, Bytes::from_static(&[2]));
//!
//! assert_eq!(frame.code(), GAME_END);
//! assert_eq!(frame.wire_len(), 2);
//! ```
//!
//! [`PayloadSizeTable`]: super::PayloadSizeTable

use bytes::Bytes;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command code.
    pub code: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from a code and payload.
    pub fn new(code: u8, payload: Bytes) -> Self {
        Self { code, payload }
    }

    /// Create a frame from a code and raw bytes (copies data).
    pub fn from_parts(code: u8, payload: &[u8]) -> Self {
        Self {
            code,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get the command code.
    #[inline]
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes this frame occupies on the wire (command byte + payload).
    #[inline]
    pub fn wire_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// Read a byte at `offset`, if present.
    #[inline]
    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.payload.get(offset).copied()
    }

    /// Read a big-endian i32 at `offset`, if present.
    pub fn i32_at(&self, offset: usize) -> Option<i32> {
        let bytes = self.payload.get(offset..offset + 4)?;
        Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Encode this frame back to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_frame(self.code, &self.payload)
    }
}

/// Build a complete frame (command byte + payload) as bytes.
pub fn build_frame(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(code);
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::from_parts(0x38, &[0xFF, 0xFF, 0xFF, 0x9C, 1, 0, 18]);

        assert_eq!(frame.code(), 0x38);
        assert_eq!(frame.wire_len(), 8);
        assert_eq!(frame.i32_at(0), Some(-100));
        assert_eq!(frame.u8_at(4), Some(1));
        assert_eq!(frame.u8_at(6), Some(18));
    }

    #[test]
    fn test_out_of_range_reads() {
        let frame = Frame::from_parts(0x38, &[0, 0, 1]);
        assert_eq!(frame.i32_at(0), None);
        assert_eq!(frame.u8_at(3), None);
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::new(0x10, Bytes::new());
        assert_eq!(frame.wire_len(), 1);
        assert_eq!(frame.to_bytes(), vec![0x10]);
    }

    #[test]
    fn test_build_frame() {
        let bytes = build_frame(0x39, &[7]);
        assert_eq!(bytes, vec![0x39, 7]);
    }
}
