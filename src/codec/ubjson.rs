//! Replay object notation (a strict subset of UBJSON).
//!
//! The replay file is a single object whose first entry is the raw frame
//! array and whose second entry is the metadata trailer:
//! ```text
//! {U\x03raw[$U#l<len:u32 BE><raw bytes...>U\x08metadata{...}}
//! ```
//!
//! Only the value types the trailer needs are supported: strings
//! (`S U <len> <bytes>`), 32-bit integers (`l <4 bytes BE>`) and nested
//! objects (`{ ... }`). Keys are always `U <len> <bytes>`.
//!
//! # Example
//!
//! ```
//! use slp_relay::codec::UbjsonWriter;
//!
//! let mut writer = UbjsonWriter::new();
//! writer.int32("lastFrame", 42).unwrap();
//! assert_eq!(writer.as_bytes(), b"U\x09lastFramel\x00\x00\x00\x2a");
//! ```

use crate::error::{RelayError, Result};

/// Type markers.
pub mod markers {
    /// Object open.
    pub const OBJECT_OPEN: u8 = b'{';
    /// Object close.
    pub const OBJECT_CLOSE: u8 = b'}';
    /// Array open.
    pub const ARRAY_OPEN: u8 = b'[';
    /// Container element type follows.
    pub const TYPE: u8 = b'$';
    /// Container element count follows.
    pub const COUNT: u8 = b'#';
    /// Unsigned 8-bit integer; also prefixes key and string lengths.
    pub const UINT8: u8 = b'U';
    /// Signed 32-bit big-endian integer.
    pub const INT32: u8 = b'l';
    /// String.
    pub const STRING: u8 = b'S';
}

/// Length of the file preamble, up to and including the raw length field.
pub const PREAMBLE_SIZE: usize = 15;

/// Offset of the u32 BE raw body length inside the preamble.
pub const RAW_LENGTH_OFFSET: u64 = 11;

/// File preamble with a zeroed raw length placeholder.
pub fn preamble() -> [u8; PREAMBLE_SIZE] {
    let mut buf = [0u8; PREAMBLE_SIZE];
    buf[..RAW_LENGTH_OFFSET as usize].copy_from_slice(&[
        markers::OBJECT_OPEN,
        markers::UINT8,
        3,
        b'r',
        b'a',
        b'w',
        markers::ARRAY_OPEN,
        markers::TYPE,
        markers::UINT8,
        markers::COUNT,
        markers::INT32,
    ]);
    buf
}

/// Writer for object entries.
///
/// Tracks nesting so a trailer cannot be finished with unbalanced objects.
#[derive(Debug, Default)]
pub struct UbjsonWriter {
    buf: Vec<u8>,
    depth: usize,
}

impl UbjsonWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a string entry.
    pub fn string(&mut self, key: &str, value: &str) -> Result<&mut Self> {
        self.key(key)?;
        self.buf.push(markers::STRING);
        self.short_str(value)?;
        Ok(self)
    }

    /// Write a signed 32-bit integer entry.
    pub fn int32(&mut self, key: &str, value: i32) -> Result<&mut Self> {
        self.key(key)?;
        self.buf.push(markers::INT32);
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(self)
    }

    /// Write an unsigned 32-bit integer entry.
    ///
    /// The notation has no unsigned 32-bit type; the value goes out under
    /// the `l` marker with its raw big-endian bits.
    pub fn uint32(&mut self, key: &str, value: u32) -> Result<&mut Self> {
        self.key(key)?;
        self.buf.push(markers::INT32);
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(self)
    }

    /// Open a nested object entry.
    pub fn begin_object(&mut self, key: &str) -> Result<&mut Self> {
        self.key(key)?;
        self.buf.push(markers::OBJECT_OPEN);
        self.depth += 1;
        Ok(self)
    }

    /// Close the innermost nested object.
    pub fn end_object(&mut self) -> Result<&mut Self> {
        if self.depth == 0 {
            return Err(RelayError::Encode("No open object to close".to_string()));
        }
        self.buf.push(markers::OBJECT_CLOSE);
        self.depth -= 1;
        Ok(self)
    }

    /// Close the root object opened by the file preamble.
    pub fn close_root(&mut self) -> Result<&mut Self> {
        if self.depth != 0 {
            return Err(RelayError::Encode(format!(
                "{} nested object(s) still open",
                self.depth
            )));
        }
        self.buf.push(markers::OBJECT_CLOSE);
        Ok(self)
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, failing if objects are left open.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.depth != 0 {
            return Err(RelayError::Encode(format!(
                "{} nested object(s) still open",
                self.depth
            )));
        }
        Ok(self.buf)
    }

    fn key(&mut self, key: &str) -> Result<()> {
        self.short_str(key)
    }

    fn short_str(&mut self, s: &str) -> Result<()> {
        let len = u8::try_from(s.len()).map_err(|_| {
            RelayError::Encode(format!("String of {} bytes exceeds 255", s.len()))
        })?;
        self.buf.push(markers::UINT8);
        self.buf.push(len);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_layout() {
        let bytes = preamble();
        assert_eq!(&bytes[..11], b"{U\x03raw[$U#l");
        assert_eq!(&bytes[11..], &[0, 0, 0, 0]);
        assert_eq!(bytes.len(), PREAMBLE_SIZE);
    }

    #[test]
    fn test_string_entry() {
        let mut writer = UbjsonWriter::new();
        writer.string("playedOn", "network").unwrap();
        assert_eq!(writer.as_bytes(), b"U\x08playedOnSU\x07network");
    }

    #[test]
    fn test_int32_negative() {
        let mut writer = UbjsonWriter::new();
        writer.int32("lastFrame", -100).unwrap();
        assert_eq!(writer.as_bytes(), b"U\x09lastFramel\xff\xff\xff\x9c");
    }

    #[test]
    fn test_uint32_uses_int32_marker() {
        let mut writer = UbjsonWriter::new();
        writer.uint32("18", 0x0102_0304).unwrap();
        assert_eq!(writer.as_bytes(), b"U\x0218l\x01\x02\x03\x04");
    }

    #[test]
    fn test_nested_objects() {
        let mut writer = UbjsonWriter::new();
        writer
            .begin_object("players")
            .unwrap()
            .begin_object("0")
            .unwrap()
            .end_object()
            .unwrap()
            .end_object()
            .unwrap();

        assert_eq!(writer.finish().unwrap(), b"U\x07players{U\x010{}}");
    }

    #[test]
    fn test_unbalanced_close_rejected() {
        let mut writer = UbjsonWriter::new();
        assert!(writer.end_object().is_err());
    }

    #[test]
    fn test_finish_with_open_object_rejected() {
        let mut writer = UbjsonWriter::new();
        writer.begin_object("metadata").unwrap();
        assert!(writer.close_root().is_err());
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_long_string_rejected() {
        let mut writer = UbjsonWriter::new();
        let long = "x".repeat(256);
        let result = writer.string("consoleNick", &long);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds 255"));
    }
}
