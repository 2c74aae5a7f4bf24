//! TCP listener for relay clients.
//!
//! Spectator tools connect here and receive a byte-for-byte mirror of the
//! console stream. Inbound bytes from clients carry no meaning; they are
//! read only to notice when the peer hangs up.
//!
//! # Example
//!
//! ```ignore
//! use slp_relay::relay::{relay_port, RelayListener};
//!
//! let port = relay_port(666, 1)?;
//! let listener = RelayListener::bind(([0, 0, 0, 0], port).into()).await?;
//! let connection = listener.accept().await?;
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::writer::spawn_client_writer;
use crate::error::{RelayError, Result};

/// Listen port for relay `id`: `base + id`.
pub fn relay_port(base: u16, id: u16) -> Result<u16> {
    base.checked_add(id).ok_or_else(|| {
        RelayError::InvalidConfig(format!("Relay port {} + {} exceeds 65535", base, id))
    })
}

/// Accepts relay clients.
pub struct RelayListener {
    listener: TcpListener,
}

impl RelayListener {
    /// Bind to `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept a single connection with `TCP_NODELAY` set.
    pub async fn accept(&self) -> Result<RelayConnection> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(RelayConnection { stream, peer })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// An accepted relay client, not yet served.
pub struct RelayConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl RelayConnection {
    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve the connection from `rx` until either side ends.
    ///
    /// `on_close` runs exactly once, after the socket is torn down.
    pub fn serve<F>(
        self,
        rx: mpsc::UnboundedReceiver<Bytes>,
        idle_timeout: Duration,
        on_close: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let peer = self.peer;
        let (read_half, write_half) = self.stream.into_split();

        tokio::spawn(async move {
            let mut writer = spawn_client_writer(write_half, rx, idle_timeout);

            tokio::select! {
                result = &mut writer => match result {
                    Ok(Ok(())) => tracing::debug!("Relay client {} writer finished", peer),
                    Ok(Err(e)) => tracing::debug!("Relay client {} dropped: {}", peer, e),
                    Err(e) => tracing::warn!("Relay client {} writer panicked: {}", peer, e),
                },
                _ = drain_inbound(read_half) => {
                    writer.abort();
                    tracing::debug!("Relay client {} hung up", peer);
                }
            }

            on_close();
        })
    }
}

/// Read and discard until EOF or error.
async fn drain_inbound<R: AsyncRead + Unpin>(mut reader: R) {
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
