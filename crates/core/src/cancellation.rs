//! Cancellation Scope
//!
//! Every suspension point in a running task receives a [`CancellationScope`]
//! and checks it by value. A scope is aborted when its token is cancelled
//! (user abort) and abandoned when the session epoch has moved past the
//! generation it was created in (a newer task instance took over).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Session-wide generation counter. Advancing it abandons every scope
/// created under an earlier generation.
#[derive(Debug, Clone, Default)]
pub struct SessionEpoch(Arc<AtomicU64>);

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Move to a new generation and return it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// New scope bound to the current generation.
    pub fn scope(&self) -> CancellationScope {
        CancellationScope {
            token: CancellationToken::new(),
            epoch: self.clone(),
            generation: self.current(),
        }
    }
}

/// Abort token plus the generation a task instance belongs to.
#[derive(Debug, Clone)]
pub struct CancellationScope {
    token: CancellationToken,
    epoch: SessionEpoch,
    generation: u64,
}

impl CancellationScope {
    /// Scope with its own epoch, for callers that never replace instances.
    pub fn detached() -> Self {
        SessionEpoch::new().scope()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Request a cooperative stop.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// True once a newer instance owns the session.
    pub fn is_abandoned(&self) -> bool {
        self.epoch.current() != self.generation
    }

    /// True when the work should stop, for either reason.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled() || self.is_abandoned()
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
