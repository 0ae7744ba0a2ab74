//! Conversation History
//!
//! The only component that touches a task's `api_conversation_history.json`.
//!
//! - `store`: in-memory log plus soft-delete range; the source of truth
//! - `persistence`: debounced, best-effort mirror of the log on disk
//! - `truncation`: when and how much of the log to hide from the model

pub mod persistence;
pub mod store;
pub mod truncation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use persistence::HistoryPersister;
pub use store::ConversationHistoryStore;
pub use truncation::{next_truncation_range, plan_truncation, TruncationKeep};

/// Errors returned by every history operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// The store was disposed; no further operations are allowed
    #[error("history store has been disposed")]
    Disposed,

    /// A deleted range or message sequence breaks the log's invariants
    #[error("invalid history: {0}")]
    Validation(String),

    /// The history file exists but could not be read or parsed
    #[error("failed to load history: {0}")]
    Load(String),

    /// Writing the history file failed
    #[error("failed to persist history: {0}")]
    Persistence(String),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Whether the on-disk file reflects the in-memory log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Everything written so far is on disk
    Synced,
    /// A write is queued behind the debounce delay
    Pending,
    /// The most recent write failed; the next mutation retries
    Failed,
}

/// Which slice of the log a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryView {
    /// Deleted range excluded
    ForModel,
    /// Every message, as persisted
    Full,
}
