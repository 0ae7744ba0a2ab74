//! Retry Strategies
//!
//! A strategy decides how often a failing tool call is retried, how long to
//! wait between attempts, and how to adjust the parameters before the next
//! attempt.

use std::time::Duration;

use taskloop_core::ToolParams;

use crate::error::{ToolError, ToolErrorKind};

pub trait RetryStrategy: Send + Sync {
    fn max_attempts(&self) -> u32;

    fn delay(&self) -> Duration;

    fn should_retry(&self, error: &ToolError) -> bool;

    /// Parameters for the next attempt.
    fn modify_parameters(&self, params: &ToolParams, _error: &ToolError) -> ToolParams {
        params.clone()
    }
}

/// Fixed attempts and delay; parameter errors are never retried.
#[derive(Debug, Clone)]
pub struct DefaultRetryStrategy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for DefaultRetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryStrategy for DefaultRetryStrategy {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay(&self) -> Duration {
        self.delay
    }

    fn should_retry(&self, error: &ToolError) -> bool {
        !error.kind.is_parameter_error()
    }
}

/// Tool-specific parameter repair applied between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterHeuristic {
    /// Escape regex metacharacters in `param` after an invalid-parameter error.
    EscapeRegex { param: String },
    /// Turn `\` into `/` in `param`.
    NormalizePathSeparators { param: String },
    /// Replace `param` with its parent directory after a not-found error.
    ParentDirectoryFallback { param: String },
    /// Fill absent parameters after a missing-parameter error.
    FillDefaults { defaults: ToolParams },
}

impl ParameterHeuristic {
    /// Whether this heuristic can repair errors of `kind`.
    pub fn handles(&self, kind: ToolErrorKind) -> bool {
        match self {
            Self::EscapeRegex { .. } => kind == ToolErrorKind::InvalidParameter,
            Self::NormalizePathSeparators { .. } => matches!(
                kind,
                ToolErrorKind::ResourceNotFound | ToolErrorKind::InvalidParameter
            ),
            Self::ParentDirectoryFallback { .. } => kind == ToolErrorKind::ResourceNotFound,
            Self::FillDefaults { .. } => kind == ToolErrorKind::MissingParameter,
        }
    }

    /// Apply to `params`; returns whether anything changed.
    pub fn apply(&self, params: &mut ToolParams) -> bool {
        match self {
            Self::EscapeRegex { param } => {
                let Some(value) = params.get(param) else {
                    return false;
                };
                let escaped = regex::escape(value);
                if &escaped == value {
                    return false;
                }
                params.insert(param.clone(), escaped);
                true
            }
            Self::NormalizePathSeparators { param } => {
                let Some(value) = params.get(param) else {
                    return false;
                };
                if !value.contains('\\') {
                    return false;
                }
                let normalized = value.replace('\\', "/");
                params.insert(param.clone(), normalized);
                true
            }
            Self::ParentDirectoryFallback { param } => {
                let Some(value) = params.get(param) else {
                    return false;
                };
                let Some(parent) = parent_of(value) else {
                    return false;
                };
                params.insert(param.clone(), parent);
                true
            }
            Self::FillDefaults { defaults } => {
                let mut changed = false;
                for (key, value) in defaults {
                    let absent = params.get(key).map_or(true, |v| v.trim().is_empty());
                    if absent {
                        params.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
                changed
            }
        }
    }
}

/// Parent of a slash-separated path; a single component falls back to ".".
fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => Some(".".to_string()),
    }
}

/// Default behaviour plus tool-specific parameter heuristics.
///
/// A heuristic makes its error kind retryable even when the default strategy
/// would give up on it (e.g. an invalid regex that can be escaped).
#[derive(Debug, Clone)]
pub struct ToolRetryStrategy {
    base: DefaultRetryStrategy,
    heuristics: Vec<ParameterHeuristic>,
}

impl ToolRetryStrategy {
    pub fn new(base: DefaultRetryStrategy) -> Self {
        Self {
            base,
            heuristics: Vec::new(),
        }
    }

    pub fn with(mut self, heuristic: ParameterHeuristic) -> Self {
        self.heuristics.push(heuristic);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.base.max_attempts = attempts;
        self
    }

    pub fn heuristics(&self) -> &[ParameterHeuristic] {
        &self.heuristics
    }
}

impl RetryStrategy for ToolRetryStrategy {
    fn max_attempts(&self) -> u32 {
        self.base.max_attempts
    }

    fn delay(&self) -> Duration {
        self.base.delay
    }

    fn should_retry(&self, error: &ToolError) -> bool {
        self.base.should_retry(error) || self.heuristics.iter().any(|h| h.handles(error.kind))
    }

    /// The first applicable heuristic that changes something wins.
    fn modify_parameters(&self, params: &ToolParams, error: &ToolError) -> ToolParams {
        for heuristic in self.heuristics.iter().filter(|h| h.handles(error.kind)) {
            let mut candidate = params.clone();
            if heuristic.apply(&mut candidate) {
                tracing::debug!(?heuristic, "adjusted parameters for retry");
                return candidate;
            }
        }
        params.clone()
    }
}

/// Built-in strategies for the bundled tools.
pub fn builtin_strategies(base: &DefaultRetryStrategy) -> Vec<(&'static str, ToolRetryStrategy)> {
    let normalize = || ParameterHeuristic::NormalizePathSeparators {
        param: "path".to_string(),
    };
    let parent = || ParameterHeuristic::ParentDirectoryFallback {
        param: "path".to_string(),
    };
    let mut search_defaults = ToolParams::new();
    search_defaults.insert("path".to_string(), ".".to_string());

    vec![
        (
            "read_file",
            ToolRetryStrategy::new(base.clone())
                .with(normalize())
                .with(parent()),
        ),
        (
            "list_files",
            ToolRetryStrategy::new(base.clone())
                .with(normalize())
                .with(parent()),
        ),
        (
            "search_files",
            ToolRetryStrategy::new(base.clone())
                .with(ParameterHeuristic::EscapeRegex {
                    param: "regex".to_string(),
                })
                .with(normalize())
                .with(ParameterHeuristic::FillDefaults {
                    defaults: search_defaults,
                }),
        ),
        (
            "write_to_file",
            ToolRetryStrategy::new(base.clone()).with(normalize()),
        ),
        // Re-running a command repeats its side effects.
        ("execute_command", ToolRetryStrategy::new(base.clone()).with_max_attempts(1)),
    ]
}
