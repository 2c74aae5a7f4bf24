//! Status module - the debounced "live" indicator.
//!
//! - [`StatusIndicator`] - show on pulse, auto-hide after the hold elapses
//! - [`SceneBackend`] - scene enumeration and visibility toggling

mod indicator;
mod scenes;

pub use indicator::StatusIndicator;
pub use scenes::{matching_targets, BoxFuture, LogOnlyBackend, SceneBackend, SceneInfo, ToggleTarget};
