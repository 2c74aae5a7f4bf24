//! Protocol module - command codes, framing, and frame types.
//!
//! This module implements the console's replay stream:
//! - Command codes and the per-session payload size table
//! - Stream reassembler for accumulating partial reads
//! - Frame struct with typed accessors

mod command;
mod frame;
mod reassembler;

pub use command::{
    encode_handshake, PayloadSizeTable, END_METHOD_NO_CONTEST, EVENT_PAYLOADS, GAME_END,
    GAME_START, KEEP_ALIVE, POST_FRAME_UPDATE, PRE_FRAME_UPDATE,
};
pub use frame::{build_frame, Frame};
pub use reassembler::StreamReassembler;
