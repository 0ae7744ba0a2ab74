//! Anthropic Provider
//!
//! Streams the Messages API over SSE. Tool uses and tool results are sent as
//! text: the model writes tool calls as XML and reads results as labelled text.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use taskloop_core::{AdapterError, ContentBlock, Message, Role, StreamAdapter, StreamIncrement};

use crate::http_client::build_http_client;
use crate::provider::{missing_api_key_error, parse_http_error, IncrementStream, ModelProvider};
use crate::streaming_adapters::ClaudeApiAdapter;
use crate::types::{LlmError, LlmResult, ModelInfo, ModelRequest, ProviderConfig};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
    model_info: ModelInfo,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);
        let client = build_http_client(config.proxy.as_deref(), timeout)?;
        let model_info = ModelInfo::for_model(&config.model, config.max_tokens);
        Ok(Self {
            config,
            client,
            model_info,
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn build_request_body(&self, request: &ModelRequest) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": request.system_prompt,
            "messages": to_api_messages(&request.messages),
            "stream": true,
        })
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model_info(&self) -> ModelInfo {
        self.model_info.clone()
    }

    async fn create_stream(&self, request: ModelRequest) -> LlmResult<IncrementStream> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        let body = self.build_request_body(&request);
        tracing::debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            "sending streaming request"
        );

        let response = self
            .client
            .post(self.base_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;
            return Err(parse_http_error(status, &body_text, "anthropic"));
        }

        Ok(sse_increments(response.bytes_stream(), ClaudeApiAdapter::new()))
    }
}

/// Render history in the Messages API shape.
pub fn to_api_messages(messages: &[Message]) -> Vec<Value> {
    let mut tool_names: HashMap<&str, &str> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        let mut blocks = Vec::new();
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => blocks.push(json!({"type": "text", "text": text})),
                ContentBlock::Image { source } => blocks.push(json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": source.media_type,
                        "data": source.data,
                    }
                })),
                ContentBlock::ToolUse { id, name, params } => {
                    tool_names.insert(id.as_str(), name.as_str());
                    let mut xml = format!("<{}>\n", name);
                    for (key, value) in params {
                        xml.push_str(&format!("<{key}>{value}</{key}>\n"));
                    }
                    xml.push_str(&format!("</{}>", name));
                    blocks.push(json!({"type": "text", "text": xml}));
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let name = tool_names.get(tool_use_id.as_str()).copied().unwrap_or("tool");
                    let label = if *is_error { "Error" } else { "Result" };
                    blocks.push(json!({
                        "type": "text",
                        "text": format!("[{}] {}:\n{}", name, label, content),
                    }));
                }
            }
        }
        if blocks.is_empty() {
            blocks.push(json!({"type": "text", "text": "(empty)"}));
        }
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        out.push(json!({"role": role, "content": blocks}));
    }
    out
}

fn adapter_error(err: AdapterError) -> LlmError {
    match err {
        AdapterError::Provider(message) if message.starts_with("overloaded_error") => {
            LlmError::ServerError {
                message,
                status: Some(529),
            }
        }
        AdapterError::Provider(message) => LlmError::Other { message },
        AdapterError::ParseError(message) | AdapterError::InvalidFormat(message) => {
            LlmError::ParseError { message }
        }
    }
}

struct SseState<S, A> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    adapter: A,
    pending: VecDeque<LlmResult<StreamIncrement>>,
    finished: bool,
}

impl<S, A: StreamAdapter> SseState<S, A> {
    /// Feed one complete line; an adapter error ends the stream.
    fn feed_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        if line.trim().is_empty() {
            return;
        }
        match self.adapter.adapt(&line) {
            Ok(increments) => self.pending.extend(increments.into_iter().map(Ok)),
            Err(e) => {
                self.pending.push_back(Err(adapter_error(e)));
                self.finished = true;
            }
        }
    }
}

/// Split a byte stream into lines and run each through `adapter`.
///
/// Lines are split on raw bytes so multi-byte characters spanning chunk
/// boundaries survive.
pub fn sse_increments<S, B, E, A>(bytes: S, adapter: A) -> IncrementStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    A: StreamAdapter + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        adapter,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(chunk.as_ref());
                    while !st.finished {
                        let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') else {
                            break;
                        };
                        let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                        st.feed_line(&line);
                    }
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(LlmError::NetworkError {
                        message: e.to_string(),
                    }));
                    st.finished = true;
                }
                None => {
                    let rest = std::mem::take(&mut st.buffer);
                    st.feed_line(&rest);
                    let tail = st.adapter.finish();
                    st.pending.extend(tail.into_iter().map(Ok));
                    st.finished = true;
                }
            }
        }
    }))
}
