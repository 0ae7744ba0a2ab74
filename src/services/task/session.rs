//! Task Session
//!
//! Holds the scope of the one task instance allowed to run. Starting a new
//! instance advances the epoch, which abandons the previous scope, and
//! cancels the previous token so anything it is awaiting wakes up.

use std::sync::Arc;

use taskloop_core::{CancellationScope, SessionEpoch};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct TaskSession {
    epoch: SessionEpoch,
    active: Arc<RwLock<Option<CancellationScope>>>,
}

impl TaskSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope for a new task instance; the previous one becomes abandoned.
    pub async fn begin(&self) -> CancellationScope {
        let mut active = self.active.write().await;
        self.epoch.advance();
        let scope = self.epoch.scope();
        if let Some(previous) = active.replace(scope.clone()) {
            tracing::debug!(
                generation = previous.generation(),
                "abandoning previous task instance"
            );
            previous.abort();
        }
        scope
    }

    /// Abort the current instance, if any.
    pub async fn abort_current(&self) {
        if let Some(scope) = self.active.read().await.as_ref() {
            scope.abort();
        }
    }
}
