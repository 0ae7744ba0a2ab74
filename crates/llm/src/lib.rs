//! taskloop LLM
//!
//! Model-facing half of the task engine:
//! - `ModelProvider` trait: an opaque source of typed stream increments
//! - Anthropic Messages API provider and its SSE adapter
//! - `StreamingRequestPipeline`: first-chunk retry with user approval,
//!   cancellation-aware consumption, cost accounting and stream metrics
//!
//! Also includes the HTTP client factory.

pub mod anthropic;
pub mod http_client;
pub mod pipeline;
pub mod provider;
pub mod streaming_adapters;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use http_client::build_http_client;
pub use pipeline::{ApiStream, RetryApprover, StreamMetrics, StreamingRequestPipeline};
pub use provider::{IncrementStream, ModelProvider};
pub use types::*;

// Re-export streaming adapters
pub use streaming_adapters::ClaudeApiAdapter;
