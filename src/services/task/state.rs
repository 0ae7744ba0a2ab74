//! Task State
//!
//! Lifecycle and accounting of one task run. Status only moves forward:
//! `Active` and `Paused` may alternate, and once a task is `Completed`,
//! `Failed` or `Aborted` it stays there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskloop_core::UsageIncrement;

use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        !self.is_terminal() && *self != next
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Token, cost and tool counters accumulated across requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub requests: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_cost: f64,
    pub tool_calls: u32,
    pub tool_failures: u32,
}

impl TaskMetrics {
    pub fn record_usage(&mut self, usage: &UsageIncrement) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cache_write_tokens += usage.cache_write_tokens;
        self.cache_read_tokens += usage.cache_read_tokens;
        self.total_cost += usage.total_cost.unwrap_or(0.0);
    }
}

/// Snapshot persisted as `task_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub id: String,
    /// The user's original request
    pub task: String,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: TaskMetrics,
}

impl TaskState {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task: task.into(),
            status: TaskStatus::Active,
            start_time: now,
            end_time: None,
            updated_at: now,
            metrics: TaskMetrics::default(),
        }
    }

    /// Continue a previous run of the same task. Completed and failed tasks
    /// cannot be revived.
    pub fn resumed_from(previous: &TaskState) -> AppResult<Self> {
        if matches!(previous.status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(AppError::invalid_state(format!(
                "task {} is {} and cannot be resumed",
                previous.id, previous.status
            )));
        }
        let mut state = Self::new(previous.id.clone(), previous.task.clone());
        state.metrics = previous.metrics.clone();
        Ok(state)
    }

    pub fn transition(&mut self, next: TaskStatus) -> AppResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::invalid_state(format!(
                "task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        tracing::debug!(task_id = %self.id, from = %self.status, to = %next, "task status");
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.end_time = Some(self.updated_at);
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// How a run of the task loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The user accepted the model's result
    Completed { result: String },
    /// The turn was cut short by a provider failure; the task can be resumed
    Interrupted { reason: String },
    /// The user aborted the task
    Aborted,
    /// A safeguard was declined by the user
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed { .. } => TaskStatus::Completed,
            Self::Interrupted { .. } => TaskStatus::Paused,
            Self::Aborted => TaskStatus::Aborted,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }
}
