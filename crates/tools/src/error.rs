//! Tool Error Taxonomy
//!
//! Every tool failure carries one of six kinds. Tools set the kind where they
//! know it; [`ToolErrorKind::classify`] is the fallback for free-form messages
//! from collaborators that only report text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolErrorKind {
    InvalidParameter,
    MissingParameter,
    PermissionDenied,
    ResourceNotFound,
    Timeout,
    Unknown,
}

impl ToolErrorKind {
    /// Classify a human-readable error message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if any(&["missing", "required parameter", "is required"]) {
            Self::MissingParameter
        } else if any(&["invalid", "malformed", "regex parse error", "unrecognized"]) {
            Self::InvalidParameter
        } else if any(&["permission denied", "access denied", "eacces", "eperm", "not permitted"]) {
            Self::PermissionDenied
        } else if any(&["not found", "no such file", "enoent", "does not exist"]) {
            Self::ResourceNotFound
        } else if any(&["timeout", "timed out", "etimedout"]) {
            Self::Timeout
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::MissingParameter => "MISSING_PARAMETER",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Errors that come from the call itself rather than the environment.
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, Self::InvalidParameter | Self::MissingParameter)
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<std::io::ErrorKind> for ToolErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => Self::ResourceNotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::TimedOut => Self::Timeout,
            std::io::ErrorKind::InvalidInput => Self::InvalidParameter,
            _ => Self::Unknown,
        }
    }
}

/// A failed tool attempt.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from a message, classifying it by content.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ToolErrorKind::classify(&message),
            message,
        }
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(
            ToolErrorKind::MissingParameter,
            format!("Missing value for required parameter '{}'", name),
        )
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParameter, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ResourceNotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, message)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.kind().into(), err.to_string())
    }
}
