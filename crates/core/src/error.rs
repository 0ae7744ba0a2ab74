//! Core Error Types
//!
//! Defines the foundational error types used across the taskloop workspace.
//! These error types are dependency-free (only thiserror + std + serde_json)
//! to keep the core crate lightweight.
//!
//! The root crate extends these with additional variants (history store,
//! stream interruption, abandonment) that need heavier context.

use thiserror::Error;

/// Core error type for the taskloop workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors (malformed ranges, illegal transitions)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation attempted in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation observed a cancellation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
