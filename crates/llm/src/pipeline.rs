//! Streaming Request Pipeline
//!
//! Issues a request through a [`ModelProvider`] and hands back an [`ApiStream`]
//! once the first increment has arrived. Only that first increment is
//! retryable, and only after the caller's [`RetryApprover`] agrees: once
//! content has streamed, a failure belongs to the consumer.
//!
//! Cancellation is cooperative. Consumers check their scope after every
//! increment. When a stream is released early it is drained in the
//! background (user abort) or dropped immediately, closing the connection
//! (abandoned instance).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use taskloop_core::{CancellationScope, StreamIncrement};

use crate::provider::{IncrementStream, ModelProvider};
use crate::types::{LlmError, LlmResult, ModelInfo, ModelRequest};

/// Decides whether a failed first chunk should be re-requested.
#[async_trait]
pub trait RetryApprover: Send + Sync {
    /// `attempt` is 1 for the original request.
    async fn approve_retry(&self, error: &LlmError, attempt: u32) -> bool;
}

/// Per-request stream statistics, reset for every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetrics {
    pub increments: usize,
    pub text_bytes: usize,
    pub first_increment_latency: Option<Duration>,
    pub elapsed: Duration,
}

/// Request pipeline bound to one provider.
#[derive(Clone)]
pub struct StreamingRequestPipeline {
    provider: Arc<dyn ModelProvider>,
}

impl StreamingRequestPipeline {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    pub fn model_info(&self) -> ModelInfo {
        self.provider.model_info()
    }

    /// Issue `request` and wait for its first increment.
    ///
    /// A failure before the first increment (connection, HTTP status, first
    /// item error, or an empty stream) is offered to `approver`; the request is
    /// re-issued only if it approves. Returns [`LlmError::Cancelled`] as soon as
    /// `scope` is aborted, including while the approval is still pending.
    pub async fn attempt_request(
        &self,
        request: ModelRequest,
        scope: &CancellationScope,
        approver: &dyn RetryApprover,
    ) -> LlmResult<ApiStream> {
        let model_info = self.provider.model_info();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if scope.is_aborted() {
                return Err(LlmError::Cancelled);
            }

            let started = Instant::now();
            let opened = tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(LlmError::Cancelled),
                opened = self.provider.create_stream(request.clone()) => opened,
            };

            let error = match opened {
                Ok(mut stream) => {
                    let first = tokio::select! {
                        biased;
                        _ = scope.cancelled() => {
                            release_stream(stream, scope);
                            return Err(LlmError::Cancelled);
                        }
                        first = stream.next() => first,
                    };
                    match first {
                        Some(Ok(increment)) => {
                            let mut api_stream = ApiStream::new(stream, model_info, started);
                            api_stream.buffer_first(increment);
                            tracing::debug!(
                                provider = self.provider.name(),
                                attempt,
                                "first increment received"
                            );
                            return Ok(api_stream);
                        }
                        Some(Err(e)) => e,
                        None => LlmError::EmptyResponse,
                    }
                }
                Err(e) => e,
            };

            tracing::warn!(
                provider = self.provider.name(),
                attempt,
                error = %error,
                "first chunk failed"
            );

            let approved = tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(LlmError::Cancelled),
                approved = approver.approve_retry(&error, attempt) => approved,
            };
            if !approved {
                return Err(error);
            }
            tracing::info!(attempt = attempt + 1, "retrying request after approval");
        }
    }
}

/// Tear down or drain a stream the consumer no longer wants.
fn release_stream(stream: IncrementStream, scope: &CancellationScope) {
    if scope.is_abandoned() {
        tracing::debug!("dropping stream of abandoned task");
        drop(stream);
    } else {
        drain_in_background(stream);
    }
}

/// Let the upstream call finish on its own and discard the output.
fn drain_in_background(mut stream: IncrementStream) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let mut discarded = 0usize;
                while let Some(item) = stream.next().await {
                    discarded += 1;
                    if item.is_err() {
                        break;
                    }
                }
                tracing::debug!(discarded, "drained aborted stream");
            });
        }
        Err(_) => drop(stream),
    }
}

/// An open response stream whose first increment already arrived.
pub struct ApiStream {
    first: Option<StreamIncrement>,
    inner: Option<IncrementStream>,
    model_info: ModelInfo,
    metrics: StreamMetrics,
    started: Instant,
}

impl ApiStream {
    fn new(inner: IncrementStream, model_info: ModelInfo, started: Instant) -> Self {
        Self {
            first: None,
            inner: Some(inner),
            model_info,
            metrics: StreamMetrics::default(),
            started,
        }
    }

    fn buffer_first(&mut self, increment: StreamIncrement) {
        self.metrics.first_increment_latency = Some(self.started.elapsed());
        self.first = Some(increment);
    }

    /// Next increment. Usage increments come back with `total_cost` set.
    /// Returns `None` once the provider closed the stream or after an error.
    pub async fn next(&mut self) -> Option<LlmResult<StreamIncrement>> {
        let item = match self.first.take() {
            Some(first) => Some(Ok(first)),
            None => match self.inner.as_mut() {
                Some(stream) => stream.next().await,
                None => None,
            },
        };

        match item {
            Some(Ok(increment)) => Some(Ok(self.observe(increment))),
            Some(Err(e)) => {
                self.inner = None;
                self.finish_metrics();
                Some(Err(e))
            }
            None => {
                if self.inner.take().is_some() {
                    self.finish_metrics();
                }
                None
            }
        }
    }

    fn observe(&mut self, increment: StreamIncrement) -> StreamIncrement {
        self.metrics.increments += 1;
        match increment {
            StreamIncrement::Usage(mut usage) => {
                usage.total_cost = Some(self.model_info.calculate_cost(&usage));
                StreamIncrement::Usage(usage)
            }
            StreamIncrement::Text { text } => {
                self.metrics.text_bytes += text.len();
                StreamIncrement::Text { text }
            }
        }
    }

    fn finish_metrics(&mut self) {
        self.metrics.elapsed = self.started.elapsed();
        tracing::debug!(
            increments = self.metrics.increments,
            text_bytes = self.metrics.text_bytes,
            first_increment_ms = self
                .metrics
                .first_increment_latency
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            elapsed_ms = self.metrics.elapsed.as_millis() as u64,
            "stream finished"
        );
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    /// Whether the upstream may still produce items.
    pub fn is_open(&self) -> bool {
        self.first.is_some() || self.inner.is_some()
    }

    /// Stop consuming. An unfinished upstream is drained in the background,
    /// or dropped immediately when `scope` has been abandoned.
    pub fn release(mut self, scope: &CancellationScope) {
        if let Some(stream) = self.inner.take() {
            self.finish_metrics();
            release_stream(stream, scope);
        }
    }
}
