//! Services
//!
//! Business logic of the task engine.

pub mod checkpoint;
pub mod history;
pub mod task;
pub mod tools;

pub use checkpoint::CheckpointTracker;
pub use history::{ConversationHistoryStore, HistoryError, HistoryView, SyncStatus};
pub use task::{TaskLoopController, TaskLoopDeps, TaskOutcome, TaskSession};
pub use tools::builtin_registry;
