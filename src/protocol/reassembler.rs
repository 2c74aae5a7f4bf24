//! Stream reassembler for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Frames carry no length prefix: the length of a frame is looked up in the
//! session's [`PayloadSizeTable`] when its command byte is reached, so the
//! caller passes the table on every extraction. This lets a handshake frame
//! change the table between two frames of the same delivery.
//!
//! # Example
//!
//! ```
//! use slp_relay::protocol::{PayloadSizeTable, StreamReassembler};
//!
//! let mut table = PayloadSizeTable::new();
//! table.insert(0x39, 1);
//!
//! let mut reassembler = StreamReassembler::new();
//! assert!(reassembler.ingest(&[0x39], &table).is_empty());
//!
//! let frames = reassembler.ingest(&[0x02], &table);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), &[0x02]);
//! ```

use bytes::{Buf, BytesMut};

use super::command::{PayloadSizeTable, EVENT_PAYLOADS, KEEP_ALIVE};
use super::Frame;

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All retained bytes live in a single `BytesMut`; extracted payloads are
/// split off and frozen without copying.
pub struct StreamReassembler {
    /// Unconsumed bytes, starting at a frame boundary.
    buffer: BytesMut,
    /// Keep-alive tokens skipped since creation.
    keep_alives: u64,
}

impl StreamReassembler {
    /// Create a new reassembler with default capacity (64KB).
    pub fn new() -> Self {
        Self::with_capacity(64 * 1024)
    }

    /// Create a new reassembler with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            keep_alives: 0,
        }
    }

    /// Append a raw delivery behind any retained bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame.
    ///
    /// Returns `None` when the retained bytes do not yet hold a whole frame.
    /// Keep-alive tokens at a frame boundary are consumed silently.
    pub fn next_frame(&mut self, table: &PayloadSizeTable) -> Option<Frame> {
        loop {
            if self.buffer.is_empty() {
                return None;
            }

            if self.buffer.starts_with(KEEP_ALIVE) {
                self.buffer.advance(KEEP_ALIVE.len());
                self.keep_alives += 1;
                continue;
            }

            // A token may be split across deliveries
            if self.buffer.len() < KEEP_ALIVE.len() && KEEP_ALIVE.starts_with(&self.buffer) {
                return None;
            }

            let code = self.buffer[0];
            let payload_len = if code == EVENT_PAYLOADS {
                // The handshake carries its own size in its first payload byte
                match self.buffer.get(1) {
                    Some(&size) => size as usize,
                    None => return None,
                }
            } else {
                table.get(code).unwrap_or(0)
            };

            if self.buffer.len() < 1 + payload_len {
                return None;
            }

            self.buffer.advance(1);
            let payload = self.buffer.split_to(payload_len).freeze();
            return Some(Frame::new(code, payload));
        }
    }

    /// Extract every complete frame using a fixed table.
    pub fn drain(&mut self, table: &PayloadSizeTable) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(table) {
            frames.push(frame);
        }
        frames
    }

    /// Push a delivery and extract every complete frame using a fixed table.
    pub fn ingest(&mut self, data: &[u8], table: &PayloadSizeTable) -> Vec<Frame> {
        self.push(data);
        self.drain(table)
    }

    /// Get the number of retained bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of keep-alive tokens skipped so far.
    pub fn keep_alives(&self) -> u64 {
        self.keep_alives
    }

    /// Drop retained bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}
