//! Stream Increment Types
//!
//! Provider-agnostic increments produced while a model response streams, and
//! the adapter trait that turns provider wire lines into them. Shared by the
//! LLM crate (adapters, request pipeline) and the root crate (task loop).

use serde::{Deserialize, Serialize};

/// Token usage reported by the provider, with the cost derived from model prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageIncrement {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    /// Filled in by the request pipeline once model pricing is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl UsageIncrement {
    /// input + output + cache-write + cache-read
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_write_tokens + self.cache_read_tokens
    }
}

/// One typed item of a streamed model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamIncrement {
    Usage(UsageIncrement),
    Text { text: String },
}

impl StreamIncrement {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Error type for stream adapters
#[derive(Debug, Clone)]
pub enum AdapterError {
    /// Invalid format that couldn't be parsed
    InvalidFormat(String),
    /// JSON/data parsing error
    ParseError(String),
    /// The provider reported an error inside the stream
    Provider(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AdapterError::Provider(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Converts provider-specific stream lines into [`StreamIncrement`]s.
///
/// Adapters may buffer state across lines (e.g. usage reported in two halves),
/// so `adapt` takes `&mut self`.
pub trait StreamAdapter: Send + Sync {
    /// Provider name for logging
    fn provider_name(&self) -> &'static str;

    /// Adapt one raw line. Lines that carry nothing yield an empty vector.
    fn adapt(&mut self, input: &str) -> Result<Vec<StreamIncrement>, AdapterError>;

    /// Flush anything still buffered when the upstream closes.
    fn finish(&mut self) -> Vec<StreamIncrement> {
        Vec::new()
    }

    /// Reset adapter state for a new request.
    fn reset(&mut self) {}
}
