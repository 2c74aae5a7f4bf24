//! Session byte arena with per-client cursors.
//!
//! Every raw delivery is appended to one growing buffer. Each client keeps
//! a cursor into that buffer; a broadcast sends each client everything from
//! its cursor to the end, so a client that joins mid-session receives the
//! whole backlog on the next delivery.
//!
//! Sending never blocks: each client's bytes go to its own writer task
//! through an unbounded channel. A client whose task has exited is kept
//! until its disconnect event arrives.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Identifier assigned to a relay connection.
pub type ClientId = u64;

/// One connected relay client.
#[derive(Debug)]
struct RelayClient {
    sender: mpsc::UnboundedSender<Bytes>,
    /// Bytes of the session buffer already handed to `sender`.
    cursor: usize,
}

/// Fans the session stream out to relay clients.
#[derive(Debug, Default)]
pub struct RelayBroadcaster {
    buffer: BytesMut,
    clients: HashMap<ClientId, RelayClient>,
}

impl RelayBroadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client with cursor 0.
    pub fn connect(&mut self, id: ClientId, sender: mpsc::UnboundedSender<Bytes>) {
        self.clients.insert(id, RelayClient { sender, cursor: 0 });
    }

    /// Deregister a client. Returns `false` if it was unknown.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Empty the session buffer and rewind every cursor.
    pub fn reset(&mut self) {
        self.buffer.clear();
        for client in self.clients.values_mut() {
            client.cursor = 0;
        }
    }

    /// Append a delivery and bring every client up to date.
    pub fn broadcast(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        let end = self.buffer.len();

        for (id, client) in self.clients.iter_mut() {
            if client.cursor >= end {
                continue;
            }
            let chunk = Bytes::copy_from_slice(&self.buffer[client.cursor..end]);
            if client.sender.send(chunk).is_err() {
                tracing::trace!("Relay client {} writer gone, awaiting disconnect", id);
            }
            client.cursor = end;
        }
    }

    /// Bytes accumulated this session.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Cursor of a client, if registered.
    pub fn cursor(&self, id: ClientId) -> Option<usize> {
        self.clients.get(&id).map(|c| c.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn test_broadcast_to_all_clients() {
        let mut broadcaster = RelayBroadcaster::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        broadcaster.connect(1, tx1);
        broadcaster.connect(2, tx2);

        broadcaster.broadcast(b"abc");
        broadcaster.broadcast(b"de");

        assert_eq!(drain(&mut rx1), b"abcde");
        assert_eq!(drain(&mut rx2), b"abcde");
        assert_eq!(broadcaster.cursor(1), Some(5));
    }

    #[test]
    fn test_late_joiner_receives_backlog() {
        let mut broadcaster = RelayBroadcaster::new();
        broadcaster.broadcast(&[7u8; 500]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.connect(9, tx);
        assert_eq!(broadcaster.cursor(9), Some(0));
        assert!(drain(&mut rx).is_empty());

        broadcaster.broadcast(&[8u8; 3]);

        let received = drain(&mut rx);
        assert_eq!(received.len(), 503);
        assert_eq!(&received[..500], &[7u8; 500][..]);
        assert_eq!(&received[500..], &[8u8; 3]);
    }

    #[test]
    fn test_reset_rewinds_cursors() {
        let mut broadcaster = RelayBroadcaster::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.connect(1, tx);
        broadcaster.broadcast(b"old session");
        drain(&mut rx);

        broadcaster.reset();
        assert_eq!(broadcaster.buffered_len(), 0);
        assert_eq!(broadcaster.cursor(1), Some(0));

        broadcaster.broadcast(b"new");
        assert_eq!(drain(&mut rx), b"new");
    }

    #[test]
    fn test_dead_client_does_not_affect_others() {
        let mut broadcaster = RelayBroadcaster::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        broadcaster.connect(1, tx1);
        broadcaster.connect(2, tx2);
        drop(rx1);

        broadcaster.broadcast(b"xyz");

        assert_eq!(drain(&mut rx2), b"xyz");
        assert_eq!(broadcaster.client_count(), 2);
        assert!(broadcaster.disconnect(1));
        assert!(!broadcaster.disconnect(1));
        assert_eq!(broadcaster.client_count(), 1);
    }
}
