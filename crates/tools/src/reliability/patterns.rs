//! Pattern History
//!
//! One [`ToolCallPattern`] per execution attempt, kept for a rolling window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taskloop_core::ToolParams;

use crate::error::ToolErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A single recorded attempt of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPattern {
    pub tool_name: String,
    pub parameters: ToolParams,
    pub outcome: CallOutcome,
    pub timestamp: DateTime<Utc>,
    /// 0 for the first attempt of a logical call
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ToolErrorKind>,
}

impl ToolCallPattern {
    pub fn success(
        tool_name: &str,
        parameters: ToolParams,
        duration_ms: u64,
        retry_count: u32,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            parameters,
            outcome: CallOutcome {
                success: true,
                duration_ms,
                error_message: None,
            },
            timestamp: Utc::now(),
            retry_count,
            error_type: None,
        }
    }

    pub fn failure(
        tool_name: &str,
        parameters: ToolParams,
        duration_ms: u64,
        retry_count: u32,
        kind: ToolErrorKind,
        message: &str,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            parameters,
            outcome: CallOutcome {
                success: false,
                duration_ms,
                error_message: Some(message.to_string()),
            },
            timestamp: Utc::now(),
            retry_count,
            error_type: Some(kind),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Patterns recorded within the rolling window, oldest first.
#[derive(Debug, Clone)]
pub struct PatternHistory {
    patterns: Vec<ToolCallPattern>,
    window: Duration,
}

impl PatternHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            patterns: Vec::new(),
            window,
        }
    }

    /// Append a pattern and drop everything older than the window.
    pub fn record(&mut self, pattern: ToolCallPattern) {
        let now = pattern.timestamp.max(Utc::now());
        self.patterns.push(pattern);
        self.prune(now);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.patterns.retain(|p| p.timestamp >= cutoff);
    }

    /// Patterns of one tool that fall inside the window ending at `now`.
    pub fn for_tool(&self, tool_name: &str, now: DateTime<Utc>) -> Vec<&ToolCallPattern> {
        let cutoff = now - self.window;
        self.patterns
            .iter()
            .filter(|p| p.tool_name == tool_name && p.timestamp >= cutoff)
            .collect()
    }

    pub fn all(&self) -> &[ToolCallPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
