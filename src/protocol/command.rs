//! Command codes and the per-session payload size table.
//!
//! The console announces the payload length of every command it will send
//! in a handshake frame (`EVENT_PAYLOADS`):
//! ```text
//! ┌──────┬──────┬──────────┬─────────────┬─────┐
//! │ 0x35 │ Size │ Code     │ Length      │ ... │
//! │ cmd  │ 1 B  │ 1 byte   │ uint16 BE   │     │
//! └──────┴──────┴──────────┴─────────────┴─────┘
//!               └──── repeated (Size - 1) / 3 times ────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use std::collections::HashMap;

use crate::error::{RelayError, Result};

/// Handshake: declares payload sizes for the session.
pub const EVENT_PAYLOADS: u8 = 0x35;
/// Game start block.
pub const GAME_START: u8 = 0x36;
/// Per-player input snapshot, before the engine step.
pub const PRE_FRAME_UPDATE: u8 = 0x37;
/// Per-player state snapshot, after the engine step.
pub const POST_FRAME_UPDATE: u8 = 0x38;
/// Game end block.
pub const GAME_END: u8 = 0x39;

/// Keep-alive sent by the console while idle. Never a frame.
pub const KEEP_ALIVE: &[u8] = b"HELO\0";

/// Game end method meaning the game was abandoned (no contest).
pub const END_METHOD_NO_CONTEST: u8 = 7;

/// Size in bytes of one (code, length) entry in the handshake payload.
const ENTRY_SIZE: usize = 3;

/// Mapping of command code to payload length, valid for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSizeTable {
    sizes: HashMap<u8, u16>,
}

impl PayloadSizeTable {
    /// Create an empty table (every code resolves to zero length).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from the payload of an `EVENT_PAYLOADS` frame.
    ///
    /// `payload[0]` is the payload size; entries follow from offset 1.
    /// A trailing partial entry is ignored.
    pub fn from_handshake(payload: &[u8]) -> Result<Self> {
        let Some(&declared) = payload.first() else {
            return Err(RelayError::Protocol("Empty handshake payload".to_string()));
        };

        let end = (declared as usize).min(payload.len());
        let entries: &[u8] = if end > 1 { &payload[1..end] } else { &[] };
        let mut sizes = HashMap::new();
        for entry in entries.chunks_exact(ENTRY_SIZE) {
            sizes.insert(entry[0], u16::from_be_bytes([entry[1], entry[2]]));
        }

        Ok(Self { sizes })
    }

    /// Register or replace the payload length for a code.
    pub fn insert(&mut self, code: u8, len: u16) {
        self.sizes.insert(code, len);
    }

    /// Payload length for `code`, or `None` if the session never declared it.
    #[inline]
    pub fn get(&self, code: u8) -> Option<usize> {
        self.sizes.get(&code).map(|&len| len as usize)
    }

    /// Check whether the session declared `code`.
    #[inline]
    pub fn contains(&self, code: u8) -> bool {
        self.sizes.contains_key(&code)
    }

    /// Number of declared codes.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Check whether no codes are declared.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.sizes.clear();
    }
}

/// Encode a handshake frame (command byte included) declaring `entries`.
///
/// Used by tests and tools that simulate a console.
pub fn encode_handshake(entries: &[(u8, u16)]) -> Vec<u8> {
    let size = 1 + entries.len() * ENTRY_SIZE;
    let mut out = Vec::with_capacity(1 + size);
    out.push(EVENT_PAYLOADS);
    out.push(size as u8);
    for (code, len) in entries {
        out.push(*code);
        out.extend_from_slice(&len.to_be_bytes());
    }
    out
}
