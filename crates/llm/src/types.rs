//! LLM Types
//!
//! Errors, provider configuration, model pricing and the request shape shared
//! by every provider.

use serde::{Deserialize, Serialize};
use taskloop_core::{Message, UsageIncrement};
use thiserror::Error;

/// Errors raised by providers and the request pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Server error ({status:?}): {message}")]
    ServerError { message: String, status: Option<u16> },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// The provider closed the stream without yielding anything.
    #[error("Empty response: the provider returned no content")]
    EmptyResponse,

    /// Consumption stopped because the task was aborted or abandoned.
    #[error("Request cancelled")]
    Cancelled,

    #[error("{message}")]
    Other { message: String },
}

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

impl LlmError {
    /// Whether the error is worth offering a retry for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::ServerError { .. }
                | LlmError::NetworkError { .. }
                | LlmError::EmptyResponse
        )
    }
}

/// Connection settings for a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Context window and pricing of the configured model.
///
/// Prices are USD per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_window: u64,
    pub max_tokens: u32,
    pub input_price: f64,
    pub output_price: f64,
    #[serde(default)]
    pub cache_write_price: f64,
    #[serde(default)]
    pub cache_read_price: f64,
}

impl ModelInfo {
    /// Pricing for well-known Anthropic models; unknown ids get Sonnet-class
    /// prices with a 200k window.
    pub fn for_model(id: &str, max_tokens: u32) -> Self {
        let (input, output, cache_write, cache_read) = if id.contains("opus") {
            (15.0, 75.0, 18.75, 1.5)
        } else if id.contains("haiku") {
            (0.8, 4.0, 1.0, 0.08)
        } else {
            (3.0, 15.0, 3.75, 0.3)
        };
        Self {
            id: id.to_string(),
            context_window: 200_000,
            max_tokens,
            input_price: input,
            output_price: output,
            cache_write_price: cache_write,
            cache_read_price: cache_read,
        }
    }

    /// Cost in USD of one usage report.
    pub fn calculate_cost(&self, usage: &UsageIncrement) -> f64 {
        let per_token = |price: f64, tokens: u64| price / 1_000_000.0 * tokens as f64;
        per_token(self.input_price, usage.input_tokens)
            + per_token(self.output_price, usage.output_tokens)
            + per_token(self.cache_write_price, usage.cache_write_tokens)
            + per_token(self.cache_read_price, usage.cache_read_tokens)
    }
}

/// What the pipeline hands to a provider: the resolved system prompt and the
/// model-facing (already truncated) history.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

impl ModelRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
        }
    }
}
