//! Recording module - replay file output and session statistics.
//!
//! - [`FileRecorder`] - owns the output file of the active recording
//! - [`RecordingStats`] - aggregates the trailer's metadata

mod file;
mod metadata;

pub use file::{recording_name, FileRecorder, REPLAY_EXTENSION};
pub use metadata::{RecordingStats, INITIAL_LAST_FRAME, PLAYED_ON};
