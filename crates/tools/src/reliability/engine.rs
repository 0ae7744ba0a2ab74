//! Tool-Call Reliability Engine
//!
//! Wraps a caller-supplied operation with the tool's retry strategy and keeps
//! the pattern history the analyzer reads from.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskloop_core::{CancellationScope, ToolParams};
use thiserror::Error;

use super::analyzer::{PatternAnalysis, PatternAnalyzer};
use super::patterns::{PatternHistory, ToolCallPattern};
use super::report::{format_params, ErrorContext, ErrorReport};
use super::strategy::{builtin_strategies, DefaultRetryStrategy, RetryStrategy};
use crate::error::ToolError;

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_pattern_window_hours() -> i64 {
    24
}

fn default_min_success_rate() -> f64 {
    0.7
}

/// Retry and analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,
    #[serde(default = "default_pattern_window_hours")]
    pub pattern_window_hours: i64,
    #[serde(default = "default_min_success_rate")]
    pub suggestion_min_success_rate: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            default_delay_ms: default_delay_ms(),
            pattern_window_hours: default_pattern_window_hours(),
            suggestion_min_success_rate: default_min_success_rate(),
        }
    }
}

impl ReliabilityConfig {
    fn default_strategy(&self) -> DefaultRetryStrategy {
        DefaultRetryStrategy {
            max_attempts: self.default_max_attempts,
            delay: Duration::from_millis(self.default_delay_ms),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ReliabilityError {
    /// Retries exhausted or not allowed; carries the last error.
    #[error("{error}")]
    Failed {
        error: ToolError,
        report: Box<ErrorReport>,
        attempts: u32,
    },

    /// The task was aborted between attempts.
    #[error("Tool call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl ReliabilityError {
    pub fn report(&self) -> Option<&ErrorReport> {
        match self {
            Self::Failed { report, .. } => Some(report),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Executes tool operations with per-tool retry and outcome tracking.
pub struct ToolCallReliabilityEngine {
    config: ReliabilityConfig,
    default_strategy: Arc<dyn RetryStrategy>,
    strategies: HashMap<String, Arc<dyn RetryStrategy>>,
    history: Mutex<PatternHistory>,
    analyzer: PatternAnalyzer,
}

impl ToolCallReliabilityEngine {
    /// Engine with only the default strategy.
    pub fn new(config: ReliabilityConfig) -> Self {
        let window = chrono::Duration::hours(config.pattern_window_hours);
        Self {
            default_strategy: Arc::new(config.default_strategy()),
            strategies: HashMap::new(),
            history: Mutex::new(PatternHistory::new(window)),
            analyzer: PatternAnalyzer::new(config.suggestion_min_success_rate),
            config,
        }
    }

    /// Engine with the bundled tools' strategies registered.
    pub fn with_builtin_strategies(config: ReliabilityConfig) -> Self {
        let mut engine = Self::new(config);
        for (name, strategy) in builtin_strategies(&engine.config.default_strategy()) {
            engine.register_strategy(name, Arc::new(strategy));
        }
        engine
    }

    pub fn register_strategy(&mut self, tool_name: &str, strategy: Arc<dyn RetryStrategy>) {
        self.strategies.insert(tool_name.to_string(), strategy);
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    fn strategy_for(&self, tool_name: &str) -> Arc<dyn RetryStrategy> {
        self.strategies
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| self.default_strategy.clone())
    }

    fn history(&self) -> MutexGuard<'_, PatternHistory> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, pattern: ToolCallPattern) {
        self.history().record(pattern);
    }

    /// Snapshot of the recorded patterns, oldest first.
    pub fn patterns(&self) -> Vec<ToolCallPattern> {
        self.history().all().to_vec()
    }

    /// Analysis of one tool over the current window.
    pub fn analyze(&self, tool_name: &str) -> PatternAnalysis {
        self.analyzer.analyze(&self.history(), tool_name, Utc::now())
    }

    /// Run `operation` with the tool's retry strategy.
    pub async fn execute<T, F, Fut>(
        &self,
        tool_name: &str,
        params: ToolParams,
        operation: F,
    ) -> Result<T, ReliabilityError>
    where
        F: FnMut(ToolParams) -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        self.execute_cancellable(tool_name, params, None, operation).await
    }

    /// Like [`execute`](Self::execute), observing `scope` before every
    /// attempt and during retry delays.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        tool_name: &str,
        params: ToolParams,
        scope: Option<&CancellationScope>,
        mut operation: F,
    ) -> Result<T, ReliabilityError>
    where
        F: FnMut(ToolParams) -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let strategy = self.strategy_for(tool_name);
        let max_attempts = strategy.max_attempts().max(1);
        let mut params = params;
        let mut attempt: u32 = 0;

        loop {
            if scope.is_some_and(|s| s.is_aborted()) {
                return Err(ReliabilityError::Cancelled { attempts: attempt });
            }

            let started = Instant::now();
            let outcome = operation(params.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(value) => {
                    self.record(ToolCallPattern::success(tool_name, params, duration_ms, attempt));
                    if attempt > 0 {
                        tracing::info!(
                            tool = tool_name,
                            attempt = attempt + 1,
                            "tool call recovered"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            self.record(ToolCallPattern::failure(
                tool_name,
                params.clone(),
                duration_ms,
                attempt,
                error.kind,
                &error.message,
            ));
            attempt += 1;

            if attempt >= max_attempts || !strategy.should_retry(&error) {
                tracing::warn!(
                    tool = tool_name,
                    attempts = attempt,
                    kind = %error.kind,
                    "tool call failed"
                );
                let context = ErrorContext {
                    tool_name: tool_name.to_string(),
                    parameters: params,
                    timestamp: Utc::now(),
                    retry_count: attempt - 1,
                };
                let report = ErrorReport::build(&error, context, &self.analyze(tool_name));
                return Err(ReliabilityError::Failed {
                    error,
                    report: Box::new(report),
                    attempts: attempt,
                });
            }

            let next = strategy.modify_parameters(&params, &error);
            if let Some(hint) = self.analyze(tool_name).suggestions.first() {
                tracing::info!(
                    tool = tool_name,
                    confidence = hint.confidence,
                    params = %format_params(&hint.parameters),
                    "previously successful parameters"
                );
            }
            tracing::debug!(
                tool = tool_name,
                attempt = attempt + 1,
                kind = %error.kind,
                "retrying tool call"
            );

            let delay = strategy.delay();
            match scope {
                Some(scope) => {
                    tokio::select! {
                        _ = scope.cancelled() => {
                            return Err(ReliabilityError::Cancelled { attempts: attempt });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
            params = next;
        }
    }
}
