//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use taskloop_core::CoreError;
use taskloop_llm::LlmError;
use thiserror::Error;

use crate::services::history::HistoryError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current task or store state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The task was aborted by the user
    #[error("Task aborted")]
    Aborted,

    /// A newer task instance replaced this one
    #[error("Task abandoned")]
    Abandoned,

    /// Conversation history store errors
    #[error("History error: {0}")]
    History(HistoryError),

    /// Streaming failures after content started arriving
    #[error("Stream error: {0}")]
    Stream(String),

    /// Provider errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error means the task stopped on request rather than failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Aborted | Self::Abandoned | Self::Llm(LlmError::Cancelled))
    }
}

/// A disposed store is a state error; everything else keeps its history context.
impl From<HistoryError> for AppError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::Disposed => Self::InvalidState(err.to_string()),
            other => Self::History(other),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => Self::Io(e),
            CoreError::Serialization(e) => Self::Serialization(e),
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::InvalidState(msg) => Self::InvalidState(msg),
            CoreError::Cancelled(_) => Self::Aborted,
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}
