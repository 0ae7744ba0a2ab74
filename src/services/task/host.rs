//! Task Host
//!
//! The task loop talks to whoever is driving it (terminal, editor, tests)
//! only through [`TaskHost`]: questions that need an answer go through `ask`,
//! everything else is reported with `say`.

use std::sync::Arc;

use async_trait::async_trait;
use taskloop_core::ToolParams;
use taskloop_llm::{LlmError, RetryApprover};

/// A question the loop needs answered before it can continue.
#[derive(Debug, Clone, PartialEq)]
pub enum Ask {
    /// Approve running a tool
    Tool { name: String, params: ToolParams },
    /// The model asked the user something
    Followup { question: String },
    /// The model believes the task is done
    CompletionResult { result: String },
    /// The first chunk of a request failed; retry?
    ApiRequestFailed { error: String, attempt: u32 },
    /// Too many consecutive model mistakes
    MistakeLimitReached { count: u32 },
    /// Too many auto-approved requests in a row
    AutoApprovalMaxReached { count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AskResponse {
    Yes,
    No,
    /// Free-form reply, treated as approval with feedback where that applies
    Message(String),
}

impl AskResponse {
    pub fn feedback(&self) -> Option<&str> {
        match self {
            Self::Message(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SayKind {
    /// Assistant text as it streams
    Text,
    ApiRequestStarted,
    ToolResult,
    CompletionResult,
    Warning,
    Error,
}

#[async_trait]
pub trait TaskHost: Send + Sync {
    async fn ask(&self, ask: Ask) -> AskResponse;

    /// `partial` is true while more of the same block is still coming.
    async fn say(&self, kind: SayKind, text: &str, partial: bool);

    /// Undo an edit that was being shown but not yet applied.
    async fn revert_pending_edits(&self) -> Result<(), String> {
        Ok(())
    }
}

/// First-chunk retries are only made when the host approves them.
pub struct HostRetryApprover {
    host: Arc<dyn TaskHost>,
}

impl HostRetryApprover {
    pub fn new(host: Arc<dyn TaskHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl RetryApprover for HostRetryApprover {
    async fn approve_retry(&self, error: &LlmError, attempt: u32) -> bool {
        let response = self
            .host
            .ask(Ask::ApiRequestFailed {
                error: error.to_string(),
                attempt,
            })
            .await;
        !matches!(response, AskResponse::No)
    }
}
