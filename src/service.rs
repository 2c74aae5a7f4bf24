//! Service builder and runtime loop.
//!
//! The [`RelayServiceBuilder`] wires optional collaborators onto a config.
//! The running service is made of:
//! 1. An engine task that owns the [`RelaySession`] and handles one event
//!    at a time (data, client joins and leaves, shutdown)
//! 2. An accept loop on the relay port, when relaying is enabled
//! 3. One writer task per relay client
//!
//! A delivery is fully processed (including a finalize it triggers) before
//! the engine looks at the next event, so a handshake that arrives while a
//! recording is being finalized waits for it.
//!
//! # Example
//!
//! ```ignore
//! use slp_relay::{RelayConfig, RelayService};
//!
//! let service = RelayService::builder(RelayConfig::load(None)?)
//!     .on_file_change(|event| println!("{:?}", event))
//!     .start()
//!     .await?;
//!
//! let upstream = tokio::net::TcpStream::connect("127.0.0.1:51441").await?;
//! service.pump(upstream).await?;
//! service.shutdown().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::relay::{ClientId, RelayListener};
use crate::session::{FileChangeCallback, FileEvent, RelaySession};
use crate::status::{SceneBackend, StatusIndicator};

/// Upstream read buffer size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Work items for the engine task.
pub(crate) enum EngineEvent {
    Data {
        data: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    ClientConnected {
        id: ClientId,
        sender: mpsc::UnboundedSender<Bytes>,
    },
    ClientDisconnected(ClientId),
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Builder for a [`RelayService`].
pub struct RelayServiceBuilder {
    config: RelayConfig,
    scene_backend: Option<Arc<dyn SceneBackend>>,
    on_file_change: Option<FileChangeCallback>,
}

impl RelayServiceBuilder {
    fn new(config: RelayConfig) -> Self {
        Self {
            config,
            scene_backend: None,
            on_file_change: None,
        }
    }

    /// Drive the live indicator through `backend`.
    ///
    /// Without a backend no indicator is created.
    pub fn scene_backend(mut self, backend: Arc<dyn SceneBackend>) -> Self {
        self.scene_backend = Some(backend);
        self
    }

    /// Call `callback` whenever a recording starts or finishes.
    pub fn on_file_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(FileEvent) + Send + Sync + 'static,
    {
        self.on_file_change = Some(Arc::new(callback));
        self
    }

    /// Build the session, bind the relay port and spawn the engine.
    pub async fn start(self) -> Result<RelayHandle> {
        RelayService::start(self).await
    }
}

/// Entry point for the relay runtime.
pub struct RelayService;

impl RelayService {
    /// Create a builder for `config`.
    pub fn builder(config: RelayConfig) -> RelayServiceBuilder {
        RelayServiceBuilder::new(config)
    }

    async fn start(builder: RelayServiceBuilder) -> Result<RelayHandle> {
        let RelayServiceBuilder {
            config,
            scene_backend,
            on_file_change,
        } = builder;
        config.validate()?;

        let mut session = RelaySession::new(&config);
        if let Some(callback) = on_file_change {
            session = session.with_file_change(callback);
        }
        if let Some(backend) = scene_backend {
            let status = StatusIndicator::new(
                backend,
                config.status.source_name.clone(),
                config.status.min_frame,
            );
            match status.refresh_targets().await {
                Ok(count) => tracing::info!("Live indicator bound to {} scene(s)", count),
                Err(e) => tracing::warn!("Scene enumeration failed: {}", e),
            }
            session = session.with_status(status);
        }

        let (events, rx) = mpsc::unbounded_channel();

        let (relay_addr, accept_task) = if config.relay.enabled {
            let listener = RelayListener::bind(config.relay_addr()?).await?;
            let addr = listener.local_addr()?;
            tracing::info!("Relaying on {}", addr);
            let task = tokio::spawn(accept_loop(
                listener,
                events.clone(),
                config.idle_timeout(),
            ));
            (Some(addr), Some(task))
        } else {
            (None, None)
        };

        let engine = tokio::spawn(engine_loop(session, rx));

        Ok(RelayHandle {
            events,
            relay_addr,
            engine,
            accept_task,
        })
    }
}

/// Handle to a running relay service.
pub struct RelayHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    relay_addr: Option<SocketAddr>,
    engine: JoinHandle<()>,
    accept_task: Option<JoinHandle<()>>,
}

impl RelayHandle {
    /// Process one raw delivery from the console.
    ///
    /// Resolves once the delivery has been parsed, recorded and relayed.
    pub async fn ingest(&self, data: Bytes) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.events
            .send(EngineEvent::Data { data, reply })
            .map_err(|_| RelayError::ConnectionClosed)?;
        done.await.map_err(|_| RelayError::ConnectionClosed)?
    }

    /// Feed everything read from `reader` until EOF.
    ///
    /// Processing errors are logged and reading continues; read errors and
    /// a stopped engine end the pump.
    pub async fn pump<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) => return Err(RelayError::Io(e)),
            };

            match self.ingest(Bytes::copy_from_slice(&buf[..n])).await {
                Ok(()) => {}
                Err(RelayError::ConnectionClosed) => return Err(RelayError::ConnectionClosed),
                Err(e) => tracing::warn!("Delivery of {} bytes failed: {}", n, e),
            }
        }
    }

    /// Relay listener address, when relaying is enabled.
    pub fn relay_addr(&self) -> Option<SocketAddr> {
        self.relay_addr
    }

    /// Stop accepting clients, abandon any unfinished recording and wait for
    /// the engine to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }

        let (reply, done) = oneshot::channel();
        if self.events.send(EngineEvent::Shutdown(reply)).is_err() {
            return Err(RelayError::ConnectionClosed);
        }
        let result = done.await.map_err(|_| RelayError::ConnectionClosed)?;

        if let Err(e) = (&mut self.engine).await {
            tracing::warn!("Engine task ended abnormally: {}", e);
        }
        result
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

/// Owns the session; applies events strictly in arrival order.
async fn engine_loop(mut session: RelaySession, mut rx: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::Data { data, reply } => {
                let result = session.ingest(&data).await;
                let _ = reply.send(result);
            }
            EngineEvent::ClientConnected { id, sender } => {
                session.broadcaster_mut().connect(id, sender);
                tracing::debug!(
                    "Relay client {} joined with {} bytes of backlog",
                    id,
                    session.broadcaster().buffered_len()
                );
            }
            EngineEvent::ClientDisconnected(id) => {
                if session.broadcaster_mut().disconnect(id) {
                    tracing::debug!("Relay client {} left", id);
                }
            }
            EngineEvent::Shutdown(reply) => {
                let _ = reply.send(session.close().await);
                return;
            }
        }
    }

    if let Err(e) = session.close().await {
        tracing::warn!("Closing session failed: {}", e);
    }
}

/// Accept relay clients and register them with the engine.
async fn accept_loop(
    listener: RelayListener,
    events: mpsc::UnboundedSender<EngineEvent>,
    idle_timeout: Duration,
) {
    let mut next_id: ClientId = 0;

    loop {
        let connection = match listener.accept().await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Relay accept failed: {}", e);
                continue;
            }
        };

        next_id += 1;
        let id = next_id;
        tracing::info!("Relay client {} connected from {}", id, connection.peer());

        let (sender, rx) = mpsc::unbounded_channel();
        if events
            .send(EngineEvent::ClientConnected { id, sender })
            .is_err()
        {
            return;
        }

        let on_close = events.clone();
        connection.serve(rx, idle_timeout, move || {
            let _ = on_close.send(EngineEvent::ClientDisconnected(id));
        });
    }
}
