//! Checkpoints
//!
//! Workspace snapshots are taken and restored by an external tracker
//! (typically a shadow git repository). The task loop only needs these three
//! calls, and treats every failure as a warning for the user.

use async_trait::async_trait;

#[async_trait]
pub trait CheckpointTracker: Send + Sync {
    /// Snapshot the workspace; returns the commit hash.
    async fn save(&self, task_id: &str) -> Result<String, String>;

    /// Reset the workspace to `hash`.
    async fn restore(&self, task_id: &str, hash: &str) -> Result<(), String>;

    /// Changes in the workspace since `hash`, as a unified diff.
    async fn diff(&self, task_id: &str, hash: &str) -> Result<String, String>;
}
