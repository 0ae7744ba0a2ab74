//! Model Provider Trait
//!
//! A provider turns a [`ModelRequest`] into a lazy sequence of typed
//! increments. The wire format stays inside the provider.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use taskloop_core::StreamIncrement;

use super::types::{LlmError, LlmResult, ModelInfo, ModelRequest};

/// Lazy, finite, non-restartable stream of increments.
pub type IncrementStream = Pin<Box<dyn Stream<Item = LlmResult<StreamIncrement>> + Send>>;

/// Trait that all model providers must implement.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Context window and pricing of the model in use.
    fn model_info(&self) -> ModelInfo;

    /// Issue the request and return the increment stream.
    ///
    /// Connection and HTTP status failures surface here; failures after the
    /// response started surface as `Err` items of the stream.
    async fn create_stream(&self, request: ModelRequest) -> LlmResult<IncrementStream>;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
