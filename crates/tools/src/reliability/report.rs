//! Error Reports
//!
//! Built when a tool call exhausts its retries: the triggering error, the
//! call context, and suggestions drawn from the pattern analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskloop_core::ToolParams;

use super::analyzer::PatternAnalysis;
use crate::error::{ToolError, ToolErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub tool_name: String,
    pub parameters: ToolParams,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSuggestion {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ToolParams>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub category: ToolErrorKind,
    pub message: String,
    pub context: ErrorContext,
    pub suggestions: Vec<ErrorSuggestion>,
}

fn category_hint(kind: ToolErrorKind) -> &'static str {
    match kind {
        ToolErrorKind::InvalidParameter => "Check the parameter values against the tool description.",
        ToolErrorKind::MissingParameter => "Provide every required parameter.",
        ToolErrorKind::PermissionDenied => {
            "The path or command is not accessible; choose another location."
        }
        ToolErrorKind::ResourceNotFound => "Verify the path exists, e.g. with list_files.",
        ToolErrorKind::Timeout => "The operation took too long; narrow its scope.",
        ToolErrorKind::Unknown => "Inspect the error message and adjust the call.",
    }
}

impl ErrorReport {
    pub fn build(error: &ToolError, context: ErrorContext, analysis: &PatternAnalysis) -> Self {
        let suggestions = analysis
            .suggestions
            .iter()
            .map(|s| ErrorSuggestion {
                description: format!(
                    "These parameters succeeded {} time(s) before: {}",
                    s.successes,
                    format_params(&s.parameters)
                ),
                parameters: Some(s.parameters.clone()),
                confidence: s.confidence,
            })
            .collect();
        Self {
            category: error.kind,
            message: error.message.clone(),
            context,
            suggestions,
        }
    }

    /// Text appended to the tool result the model sees.
    pub fn to_tool_output(&self) -> String {
        let mut out = format!(
            "{} ({}, after {} attempt(s))\nHint: {}",
            self.message,
            self.category,
            self.context.retry_count + 1,
            category_hint(self.category)
        );
        for s in &self.suggestions {
            out.push_str(&format!(
                "\nSuggestion ({:.0}% success): {}",
                s.confidence * 100.0,
                s.description
            ));
        }
        out
    }
}

pub(crate) fn format_params(params: &ToolParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={:?}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
