//! Command dispatch and recording lifecycle.
//!
//! The dispatcher interprets each frame, owns the session's payload size
//! table and the statistics of the active recording, and tells the caller
//! which side effects the frame requires. It performs no I/O itself.
//!
//! ```text
//!            handshake                 game end
//!   Idle ───────────────► Recording ──────────────► Idle
//!                          │    ▲      (after finalize)
//!                          └────┘
//!                        handshake
//!                  (abandons the open recording)
//! ```

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::protocol::{
    Frame, PayloadSizeTable, END_METHOD_NO_CONTEST, EVENT_PAYLOADS, GAME_END, POST_FRAME_UPDATE,
};
use crate::recording::RecordingStats;

/// How long a pulse keeps the live indicator shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Regular gameplay frame.
    Default,
    /// A game that ended with a result; the indicator lingers.
    Extended,
}

impl Hold {
    /// Resolve to a duration.
    pub fn duration(self, default: Duration, extended: Duration) -> Duration {
        match self {
            Hold::Default => default,
            Hold::Extended => extended,
        }
    }
}

/// Side effects a frame requires, applied by the caller in this order:
/// start recording, pulse, persist the frame, finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Open a new output file (the frame is its first frame).
    pub start_recording: bool,
    /// Pulse the live indicator.
    pub pulse: Option<Hold>,
    /// Append the trailer and close the recording after persisting.
    pub finalize: bool,
}

impl Dispatch {
    /// Persist only.
    pub const PERSIST: Dispatch = Dispatch {
        start_recording: false,
        pulse: None,
        finalize: false,
    };
}

/// Frame index, player and character of a post-frame update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameUpdate {
    pub frame_index: i32,
    pub player: u8,
    pub is_follower: bool,
    pub character: u8,
}

impl FrameUpdate {
    /// Parse the fixed-offset fields of a `POST_FRAME_UPDATE` payload.
    pub fn parse(frame: &Frame) -> Option<Self> {
        Some(Self {
            frame_index: frame.i32_at(0)?,
            player: frame.u8_at(4)?,
            is_follower: frame.u8_at(5)? != 0,
            character: frame.u8_at(6)?,
        })
    }
}

/// Interprets frames and tracks the recording lifecycle.
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    table: PayloadSizeTable,
    /// `Some` while recording.
    stats: Option<RecordingStats>,
    /// Undeclared codes already reported this session.
    warned: HashSet<u8>,
}

impl CommandDispatcher {
    /// Create an idle dispatcher with an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload size table of the current session.
    #[inline]
    pub fn table(&self) -> &PayloadSizeTable {
        &self.table
    }

    /// Statistics of the active recording.
    pub fn stats(&self) -> Option<&RecordingStats> {
        self.stats.as_ref()
    }

    /// Check whether a recording is active.
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.stats.is_some()
    }

    /// `lastFrame` of the active recording.
    pub fn last_frame(&self) -> Option<i32> {
        self.stats.as_ref().map(RecordingStats::last_frame)
    }

    /// Interpret one frame.
    ///
    /// `now` becomes the start time when the frame is a handshake.
    pub fn dispatch(&mut self, frame: &Frame, now: DateTime<Utc>) -> Result<Dispatch> {
        match frame.code {
            EVENT_PAYLOADS => self.on_handshake(frame, now),
            POST_FRAME_UPDATE => Ok(self.on_frame_update(frame)),
            GAME_END => Ok(self.on_game_end(frame)),
            code => {
                if !self.table.contains(code) && self.warned.insert(code) {
                    tracing::warn!(
                        "Command 0x{:02x} not declared by handshake, assuming empty payload",
                        code
                    );
                }
                Ok(Dispatch::PERSIST)
            }
        }
    }

    /// Leave the recording state, handing back its statistics.
    pub fn finish_recording(&mut self) -> Option<RecordingStats> {
        self.stats.take()
    }

    fn on_handshake(&mut self, frame: &Frame, now: DateTime<Utc>) -> Result<Dispatch> {
        let table = PayloadSizeTable::from_handshake(frame.payload())?;

        if self.stats.is_some() {
            tracing::warn!("Handshake received mid-recording, starting over");
        }
        tracing::debug!("Handshake declared {} command sizes", table.len());

        self.table = table;
        self.warned.clear();
        self.stats = Some(RecordingStats::new(now));

        Ok(Dispatch {
            start_recording: true,
            pulse: None,
            finalize: false,
        })
    }

    fn on_frame_update(&mut self, frame: &Frame) -> Dispatch {
        let Some(update) = FrameUpdate::parse(frame) else {
            tracing::warn!(
                "Post-frame update too short ({} bytes)",
                frame.payload.len()
            );
            return Dispatch::PERSIST;
        };

        if update.is_follower {
            return Dispatch::PERSIST;
        }

        let Some(stats) = self.stats.as_mut() else {
            return Dispatch::PERSIST;
        };

        stats.record_frame(update.frame_index, update.player, update.character);
        Dispatch {
            pulse: Some(Hold::Default),
            ..Dispatch::PERSIST
        }
    }

    fn on_game_end(&mut self, frame: &Frame) -> Dispatch {
        let pulse = match frame.u8_at(0) {
            Some(END_METHOD_NO_CONTEST) | None => None,
            Some(_) => Some(Hold::Extended),
        };

        Dispatch {
            start_recording: false,
            pulse,
            finalize: true,
        }
    }
}
