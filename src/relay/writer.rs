//! Dedicated writer task per relay client.
//!
//! The broadcaster never touches sockets. It pushes chunks into an unbounded
//! channel and this task drains them, batching whatever is ready into a
//! single vectored write.
//!
//! # Architecture
//!
//! ```text
//! RelayBroadcaster ─► mpsc::UnboundedSender<Bytes> ─► Writer Task ─► TcpStream
//! ```
//!
//! The task ends when the channel closes, a write fails, or nothing arrives
//! for the idle timeout.

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result};

/// Maximum chunks to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Spawn the writer task for one client.
///
/// Returns the task handle; the task drains `rx` into `writer`.
pub fn spawn_client_writer<W>(
    writer: W,
    rx: mpsc::UnboundedReceiver<Bytes>,
    idle_timeout: Duration,
) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(writer_loop(rx, writer, idle_timeout))
}

/// Main writer loop - receives chunks and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut writer: W,
    idle_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(chunk)) => chunk,
            // Channel closed, clean shutdown
            Ok(None) => return Ok(()),
            Err(_) => return Err(RelayError::IdleTimeout(idle_timeout)),
        };

        // Collect additional ready chunks (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(chunk) => batch.push(chunk),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
    }
}

/// Write a batch of chunks using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(Bytes::len).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut skipped = 0;

    for chunk in batch {
        let start = skipped;
        let end = skipped + chunk.len();

        if skip_bytes < end && !chunk.is_empty() {
            let start_in_chunk = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&chunk[start_in_chunk..]));
        }
        skipped = end;
    }

    slices
}
