//! Replay file output.
//!
//! A recording is written in three phases:
//! 1. `new_recording` creates the file and writes the preamble with a zeroed
//!    raw length placeholder
//! 2. `write_frame` appends frames verbatim, in call order
//! 3. `finalize` appends the trailer, closes the file, reopens it and patches
//!    the placeholder with the raw byte count, then closes it again
//!
//! Each step is awaited before the next one is issued, so bytes land in
//! exactly the order the calls were made.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::RecordingStats;
use crate::codec::{preamble, RAW_LENGTH_OFFSET};
use crate::error::{RelayError, Result};
use crate::protocol::Frame;

/// Replay file extension.
pub const REPLAY_EXTENSION: &str = "slp";

/// How many suffixed names to try before giving up on a colliding name.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// The file currently receiving frames.
struct OpenRecording {
    file: File,
    path: PathBuf,
    /// Raw body bytes written (sum of `1 + payload_len` per frame).
    bytes_written: u32,
}

/// Owns the output file of the active recording.
pub struct FileRecorder {
    output_dir: PathBuf,
    current: Option<OpenRecording>,
}

impl FileRecorder {
    /// Create a recorder writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            current: None,
        }
    }

    /// Directory new recordings are created in.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Check whether a file is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Path of the open file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(|r| r.path.as_path())
    }

    /// Raw body bytes written to the open file (0 when none is open).
    pub fn bytes_written(&self) -> u32 {
        self.current.as_ref().map_or(0, |r| r.bytes_written)
    }

    /// Start a new file for a recording that began at `started_at`.
    ///
    /// A file that is still open is abandoned: it is closed as-is, without a
    /// trailer and with its length placeholder left at zero.
    pub async fn new_recording(&mut self, started_at: DateTime<Utc>) -> Result<PathBuf> {
        if let Err(e) = self.abandon().await {
            tracing::warn!("Flush of abandoned recording failed: {}", e);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| RelayError::OpenRecording {
                path: self.output_dir.clone(),
                source,
            })?;

        let (mut file, path) = create_unique(&self.output_dir, started_at).await?;
        file.write_all(&preamble()).await?;

        tracing::debug!("Opened recording {}", path.display());
        self.current = Some(OpenRecording {
            file,
            path: path.clone(),
            bytes_written: 0,
        });
        Ok(path)
    }

    /// Close the open file as-is: no trailer, placeholder left at zero.
    pub async fn abandon(&mut self) -> Result<()> {
        let Some(mut abandoned) = self.current.take() else {
            return Ok(());
        };
        tracing::warn!(
            "Abandoning recording {} without trailer ({} bytes)",
            abandoned.path.display(),
            abandoned.bytes_written
        );
        abandoned.file.flush().await?;
        Ok(())
    }

    /// Append a frame verbatim. No-op when no file is open.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let Some(recording) = self.current.as_mut() else {
            return Ok(());
        };

        recording.file.write_all(&[frame.code]).await?;
        if !frame.payload.is_empty() {
            recording.file.write_all(&frame.payload).await?;
        }
        recording.bytes_written += frame.wire_len() as u32;
        Ok(())
    }

    /// Append the trailer and patch the raw length.
    ///
    /// Returns the finished file's path, or `None` when no file was open.
    /// The recorder is closed afterwards whether or not a step failed.
    pub async fn finalize(
        &mut self,
        stats: &RecordingStats,
        console_nick: &str,
    ) -> Result<Option<PathBuf>> {
        let Some(mut recording) = self.current.take() else {
            return Ok(None);
        };

        let trailer = match stats.encode_trailer(console_nick) {
            Ok(trailer) => trailer,
            Err(e) => {
                recording.file.flush().await?;
                return Err(e);
            }
        };

        recording.file.write_all(&trailer).await?;
        recording.file.flush().await?;
        drop(recording.file);

        patch_raw_length(&recording.path, recording.bytes_written).await?;

        tracing::debug!(
            "Finalized {} with {} raw bytes",
            recording.path.display(),
            recording.bytes_written
        );
        Ok(Some(recording.path))
    }
}

/// Reopen `path` and overwrite the raw length placeholder.
async fn patch_raw_length(path: &Path, raw_len: u32) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(RAW_LENGTH_OFFSET)).await?;
    file.write_all(&raw_len.to_be_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// File name for a recording: `Game_YYYYMMDDTHHMMSS[_N].slp` in local time.
pub fn recording_name(started_at: DateTime<Utc>, attempt: u32) -> String {
    let stamp = started_at
        .with_timezone(&Local)
        .format("%Y%m%dT%H%M%S");
    if attempt == 0 {
        format!("Game_{}.{}", stamp, REPLAY_EXTENSION)
    } else {
        format!("Game_{}_{}.{}", stamp, attempt, REPLAY_EXTENSION)
    }
}

/// Create a file that did not exist before, suffixing the name on collision.
async fn create_unique(dir: &Path, started_at: DateTime<Utc>) -> Result<(File, PathBuf)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(recording_name(started_at, attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(RelayError::OpenRecording { path, source }),
        }
    }

    Err(RelayError::OpenRecording {
        path: dir.join(recording_name(started_at, 0)),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free file name for this timestamp",
        ),
    })
}
