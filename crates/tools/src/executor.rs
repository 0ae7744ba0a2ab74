//! Tool Execution Result
//!
//! Portable result type returned by every tool implementation.

use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolErrorKind};

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Output from the tool (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured failure kind, when the tool knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    /// Whether the tool changed the workspace (files, processes)
    #[serde(default)]
    pub side_effect: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            error_kind: None,
            side_effect: false,
        }
    }

    /// Create an error result; the kind is inferred from the message.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            error_kind: None,
            side_effect: false,
        }
    }

    /// Create an error result with a known kind
    pub fn err_kind(kind: ToolErrorKind, error: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind),
            ..Self::err(error)
        }
    }

    /// Mark the result as having changed the workspace.
    pub fn with_side_effect(mut self) -> Self {
        self.side_effect = true;
        self
    }

    /// Convert to string for LLM consumption
    pub fn to_content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("Unknown error"))
        }
    }

    /// Split into output or a classified [`ToolError`].
    pub fn into_result(self) -> Result<ToolResult, ToolError> {
        if self.success {
            return Ok(self);
        }
        let message = self
            .error
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(match self.error_kind {
            Some(kind) => ToolError::new(kind, message),
            None => ToolError::classified(message),
        })
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::err_kind(err.kind, err.message)
    }
}
