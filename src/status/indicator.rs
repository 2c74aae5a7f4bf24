//! Debounced "live" indicator.
//!
//! Each pulse shows the indicator and (re)arms a single auto-hide timer.
//! Re-arming aborts the previous timer task; a generation counter guards
//! the window where an aborted timer has already woken up.
//!
//! Visibility changes are delivered to the scene backend by one toggle
//! task, so show and hide calls reach the backend in transition order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::scenes::{matching_targets, SceneBackend, ToggleTarget};
use crate::error::Result;

#[derive(Debug, Default)]
struct StatusState {
    visible: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<StatusState>,
    toggles: mpsc::UnboundedSender<bool>,
}

/// Drives the live indicator source.
pub struct StatusIndicator {
    shared: Arc<Shared>,
    backend: Arc<dyn SceneBackend>,
    targets: Arc<Mutex<Vec<ToggleTarget>>>,
    source_name: String,
    min_frame: i32,
    toggle_task: JoinHandle<()>,
}

impl StatusIndicator {
    /// Create a hidden indicator. Targets are empty until
    /// [`refresh_targets`](Self::refresh_targets) runs.
    ///
    /// Pulses while `lastFrame < min_frame` are ignored.
    pub fn new(
        backend: Arc<dyn SceneBackend>,
        source_name: impl Into<String>,
        min_frame: i32,
    ) -> Self {
        let (toggles, rx) = mpsc::unbounded_channel();
        let targets = Arc::new(Mutex::new(Vec::new()));
        let toggle_task = tokio::spawn(toggle_loop(rx, backend.clone(), targets.clone()));

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StatusState::default()),
                toggles,
            }),
            backend,
            targets,
            source_name: source_name.into(),
            min_frame,
            toggle_task,
        }
    }

    /// Enumerate scenes and cache every pair holding the indicator source.
    ///
    /// Returns the number of pairs found.
    pub async fn refresh_targets(&self) -> Result<usize> {
        let scenes = self.backend.list_scenes().await?;
        let found = matching_targets(&scenes, &self.source_name);
        let count = found.len();

        if count == 0 {
            tracing::warn!("No scene contains source '{}'", self.source_name);
        }
        *self.targets.lock() = found;
        Ok(count)
    }

    /// Cached (scene, source) pairs.
    pub fn targets(&self) -> Vec<ToggleTarget> {
        self.targets.lock().clone()
    }

    /// Check whether the indicator is shown.
    pub fn is_visible(&self) -> bool {
        self.shared.state.lock().visible
    }

    /// Show the indicator for `hold`, replacing any pending auto-hide.
    ///
    /// Ignored entirely while `last_frame` is below the threshold.
    pub fn pulse(&self, last_frame: i32, hold: Duration) {
        if last_frame < self.min_frame {
            return;
        }

        let mut state = self.shared.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        if !state.visible {
            state.visible = true;
            let _ = self.shared.toggles.send(true);
        }

        let shared = self.shared.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;

            let mut state = shared.state.lock();
            if state.generation != generation || !state.visible {
                return;
            }
            state.visible = false;
            state.timer = None;
            let _ = shared.toggles.send(false);
        }));
    }
}

impl Drop for StatusIndicator {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.state.lock().timer.take() {
            timer.abort();
        }
        self.toggle_task.abort();
    }
}

/// Apply visibility changes to every cached target, in order.
async fn toggle_loop(
    mut rx: mpsc::UnboundedReceiver<bool>,
    backend: Arc<dyn SceneBackend>,
    targets: Arc<Mutex<Vec<ToggleTarget>>>,
) {
    while let Some(visible) = rx.recv().await {
        let snapshot = targets.lock().clone();
        for target in &snapshot {
            if let Err(e) = backend
                .set_source_visible(&target.scene, &target.source, visible)
                .await
            {
                tracing::warn!(
                    "Failed to toggle {} in {}: {}",
                    target.source,
                    target.scene,
                    e
                );
            }
        }
    }
}
