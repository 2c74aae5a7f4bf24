//! Ingest pipeline for one console stream.
//!
//! [`RelaySession`] owns every piece of per-stream state and processes one
//! delivery at a time:
//!
//! ```text
//! raw bytes ─► StreamReassembler ─► Frame ─► CommandDispatcher
//!                                               │
//!             ┌─────────────────┬───────────────┼────────────────┐
//!             ▼                 ▼               ▼                ▼
//!      new recording     StatusIndicator   write_frame      finalize
//!
//! raw bytes (after all frames) ─► RelayBroadcaster ─► clients
//! ```
//!
//! Every effect of a frame completes before the next frame is parsed, so
//! the output file sees frames in arrival order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::RelayConfig;
use crate::dispatcher::{CommandDispatcher, Dispatch};
use crate::error::Result;
use crate::protocol::{Frame, PayloadSizeTable, StreamReassembler};
use crate::recording::{FileRecorder, RecordingStats};
use crate::relay::RelayBroadcaster;
use crate::status::StatusIndicator;

/// Change to the set of replay files on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A handshake opened a new file.
    RecordingStarted(PathBuf),
    /// A file received its trailer and length.
    RecordingFinished(PathBuf),
}

/// Callback for [`FileEvent`]s.
pub type FileChangeCallback = Arc<dyn Fn(FileEvent) + Send + Sync>;

/// Per-stream reassembly, recording and relay state.
pub struct RelaySession {
    reassembler: StreamReassembler,
    dispatcher: CommandDispatcher,
    recorder: FileRecorder,
    broadcaster: RelayBroadcaster,
    status: Option<StatusIndicator>,
    on_file_change: Option<FileChangeCallback>,
    console_nick: String,
    default_hold: Duration,
    extended_hold: Duration,
}

impl RelaySession {
    /// Create an idle session from `config`.
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            reassembler: StreamReassembler::new(),
            dispatcher: CommandDispatcher::new(),
            recorder: FileRecorder::new(&config.output_dir),
            broadcaster: RelayBroadcaster::new(),
            status: None,
            on_file_change: None,
            console_nick: config.console_nick.clone(),
            default_hold: config.default_hold(),
            extended_hold: config.extended_hold(),
        }
    }

    /// Attach a live indicator.
    pub fn with_status(mut self, status: StatusIndicator) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a file change callback.
    pub fn with_file_change(mut self, callback: FileChangeCallback) -> Self {
        self.on_file_change = Some(callback);
        self
    }

    /// Process one raw delivery.
    ///
    /// All complete frames are dispatched and the delivery is relayed even
    /// when a frame fails; the first failure is returned afterwards.
    pub async fn ingest(&mut self, data: &[u8]) -> Result<()> {
        self.reassembler.push(data);

        let mut first_error = None;
        while let Some(frame) = self.reassembler.next_frame(self.dispatcher.table()) {
            if let Err(e) = self.process_frame(frame).await {
                tracing::warn!("Frame processing failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        self.broadcaster.broadcast(data);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn process_frame(&mut self, frame: Frame) -> Result<()> {
        let dispatch: Dispatch = self.dispatcher.dispatch(&frame, Utc::now())?;

        // A failed open leaves the session recording without a file; the
        // error is reported once the frame has been handled.
        let opened = if dispatch.start_recording {
            self.start_recording().await
        } else {
            Ok(())
        };

        if let (Some(hold), Some(status)) = (dispatch.pulse, self.status.as_ref()) {
            if let Some(last_frame) = self.dispatcher.last_frame() {
                status.pulse(
                    last_frame,
                    hold.duration(self.default_hold, self.extended_hold),
                );
            }
        }

        self.recorder.write_frame(&frame).await?;

        if dispatch.finalize {
            self.finish_recording().await?;
        }
        opened
    }

    async fn start_recording(&mut self) -> Result<()> {
        self.broadcaster.reset();

        let started_at = self
            .dispatcher
            .stats()
            .map(RecordingStats::started_at)
            .unwrap_or_else(Utc::now);
        let path = self.recorder.new_recording(started_at).await?;

        tracing::info!("Recording to {}", path.display());
        self.notify(FileEvent::RecordingStarted(path));
        Ok(())
    }

    async fn finish_recording(&mut self) -> Result<()> {
        let Some(stats) = self.dispatcher.finish_recording() else {
            return Ok(());
        };

        if let Some(path) = self.recorder.finalize(&stats, &self.console_nick).await? {
            tracing::info!(
                "Finished {} at frame {}",
                path.display(),
                stats.last_frame()
            );
            self.notify(FileEvent::RecordingFinished(path));
        }
        Ok(())
    }

    fn notify(&self, event: FileEvent) {
        if let Some(callback) = &self.on_file_change {
            callback(event);
        }
    }

    /// Flush and drop an unfinished recording.
    pub async fn close(&mut self) -> Result<()> {
        if self.dispatcher.finish_recording().is_some() {
            tracing::warn!("Closing with a recording in progress, no trailer written");
        }
        self.recorder.abandon().await
    }

    /// Payload sizes of the current session.
    pub fn table(&self) -> &PayloadSizeTable {
        self.dispatcher.table()
    }

    /// Statistics of the active recording.
    pub fn stats(&self) -> Option<&RecordingStats> {
        self.dispatcher.stats()
    }

    /// Check whether a recording is active.
    pub fn is_recording(&self) -> bool {
        self.dispatcher.is_recording()
    }

    pub fn recorder(&self) -> &FileRecorder {
        &self.recorder
    }

    pub fn broadcaster(&self) -> &RelayBroadcaster {
        &self.broadcaster
    }

    pub fn broadcaster_mut(&mut self) -> &mut RelayBroadcaster {
        &mut self.broadcaster
    }

    pub fn status(&self) -> Option<&StatusIndicator> {
        self.status.as_ref()
    }
}
