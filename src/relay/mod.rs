//! Relay module - fan-out of the raw stream to spectator clients.
//!
//! - [`RelayBroadcaster`] - session byte arena with per-client cursors
//! - [`RelayListener`] - TCP accept with `TCP_NODELAY`
//! - per-client writer tasks with an idle timeout

mod broadcaster;
mod listener;
mod writer;

pub use broadcaster::{ClientId, RelayBroadcaster};
pub use listener::{relay_port, RelayConnection, RelayListener};
pub use writer::spawn_client_writer;
