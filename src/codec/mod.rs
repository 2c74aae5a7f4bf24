//! Codec module - encoding for the replay file container.
//!
//! - [`UbjsonWriter`] - tag-length-value entries for the metadata trailer
//! - [`preamble`] - fixed file header carrying the raw length placeholder
//!
//! # Design
//!
//! The writer only emits; nothing in the relay reads replay files back, so
//! there is no decoder.

mod ubjson;

pub use ubjson::{markers, preamble, UbjsonWriter, PREAMBLE_SIZE, RAW_LENGTH_OFFSET};
