//! # slp-relay
//!
//! Ingests a live console replay stream, writes each game to a `.slp`
//! file and mirrors the raw stream to any number of TCP spectators.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): command byte plus a payload whose size
//!   comes from the table announced in the stream's handshake
//! - **Dispatch** ([`dispatcher`]): per-command state machine deciding when
//!   a recording starts, pulses the live indicator, or ends
//! - **Recording** ([`recording`], [`codec`]): raw frames followed by a
//!   metadata trailer, with the raw length patched into the preamble
//! - **Relay** ([`relay`]): every byte buffered per recording and replayed
//!   to late joiners from their own cursor
//! - **Status** ([`status`]): debounced "live" source toggled through a
//!   scene backend
//!
//! ## Example
//!
//! ```ignore
//! use slp_relay::{RelayConfig, RelayService};
//!
//! #[tokio::main]
//! async fn main() -> slp_relay::error::Result<()> {
//!     let config = RelayConfig::load(None)?;
//!     let upstream = tokio::net::TcpStream::connect(config.upstream_addr()).await?;
//!
//!     let service = RelayService::builder(config).start().await?;
//!     service.pump(upstream).await?;
//!     service.shutdown().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod recording;
pub mod relay;
pub mod session;
pub mod status;

mod service;

pub use config::RelayConfig;
pub use error::RelayError;
pub use service::{RelayHandle, RelayService, RelayServiceBuilder};
pub use session::{FileEvent, RelaySession};
