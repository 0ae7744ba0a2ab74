//! Tool-Call Reliability
//!
//! Every tool invocation goes through [`ToolCallReliabilityEngine::execute`],
//! which retries per a tool-specific [`RetryStrategy`], records one
//! [`ToolCallPattern`] per attempt, and on exhaustion returns the last error
//! with an [`ErrorReport`] built from the pattern history.

pub mod analyzer;
pub mod engine;
pub mod patterns;
pub mod report;
pub mod strategy;

pub use analyzer::{ParameterSuggestion, PatternAnalysis, PatternAnalyzer};
pub use engine::{ReliabilityConfig, ReliabilityError, ToolCallReliabilityEngine};
pub use patterns::{CallOutcome, PatternHistory, ToolCallPattern};
pub use report::{ErrorContext, ErrorReport, ErrorSuggestion};
pub use strategy::{DefaultRetryStrategy, ParameterHeuristic, RetryStrategy, ToolRetryStrategy};
