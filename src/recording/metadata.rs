//! Aggregated recording statistics and the metadata trailer.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::codec::UbjsonWriter;
use crate::error::Result;

/// `lastFrame` before any frame update is seen (first game frame is -123).
pub const INITIAL_LAST_FRAME: i32 = -124;

/// Source recorded in the `playedOn` field.
pub const PLAYED_ON: &str = "network";

/// Statistics gathered while a recording is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingStats {
    started_at: DateTime<Utc>,
    last_frame: i32,
    /// player index -> internal character id -> observed frames.
    characters: BTreeMap<u8, BTreeMap<u8, u32>>,
}

impl RecordingStats {
    /// Fresh statistics for a recording that began at `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_frame: INITIAL_LAST_FRAME,
            characters: BTreeMap::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_frame(&self) -> i32 {
        self.last_frame
    }

    /// Account one non-follower frame update.
    pub fn record_frame(&mut self, frame_index: i32, player: u8, character: u8) {
        self.last_frame = frame_index;
        *self
            .characters
            .entry(player)
            .or_default()
            .entry(character)
            .or_insert(0) += 1;
    }

    /// Frames observed for `(player, character)`.
    pub fn character_usage(&self, player: u8, character: u8) -> u32 {
        self.characters
            .get(&player)
            .and_then(|chars| chars.get(&character))
            .copied()
            .unwrap_or(0)
    }

    /// Per-player character usage.
    pub fn players(&self) -> &BTreeMap<u8, BTreeMap<u8, u32>> {
        &self.characters
    }

    /// Encode the metadata trailer, including the byte that closes the
    /// file's root object.
    pub fn encode_trailer(&self, console_nick: &str) -> Result<Vec<u8>> {
        let start_at = self
            .started_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut writer = UbjsonWriter::new();
        writer
            .begin_object("metadata")?
            .string("startAt", &start_at)?
            .int32("lastFrame", self.last_frame)?
            .string("consoleNick", console_nick)?
            .begin_object("players")?;

        for (player, chars) in &self.characters {
            writer
                .begin_object(&player.to_string())?
                .begin_object("characters")?;
            for (character, count) in chars {
                writer.uint32(&character.to_string(), *count)?;
            }
            writer.end_object()?.end_object()?;
        }

        writer
            .end_object()?
            .string("playedOn", PLAYED_ON)?
            .end_object()?
            .close_root()?;
        writer.finish()
    }
}
