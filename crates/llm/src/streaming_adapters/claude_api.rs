//! Claude API Adapter
//!
//! Handles the SSE format from Claude API with content_block_delta parsing.
//! Only text and usage matter to the task loop; tool uses travel as XML
//! inside the text.

use serde::Deserialize;
use taskloop_core::streaming::{AdapterError, StreamAdapter, StreamIncrement, UsageIncrement};

/// Internal event types from Claude API SSE format
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeApiEvent {
    MessageStart {
        message: MessageInfo,
    },
    ContentBlockStart {
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Adapter for Claude API SSE format
#[derive(Debug, Default)]
pub struct ClaudeApiAdapter {
    events_seen: usize,
}

impl ClaudeApiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_seen(&self) -> usize {
        self.events_seen
    }
}

impl StreamAdapter for ClaudeApiAdapter {
    fn provider_name(&self) -> &'static str {
        "claude-api"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<StreamIncrement>, AdapterError> {
        let trimmed = input.trim();

        // SSE streams may include event:, id:, retry:, and comment lines.
        let json_str = if let Some(rest) = trimmed.strip_prefix("data:") {
            rest.trim_start()
        } else if trimmed.starts_with('{') {
            trimmed
        } else {
            return Ok(vec![]);
        };

        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(vec![]);
        }

        let event: ClaudeApiEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;
        self.events_seen += 1;

        let increments = match event {
            ClaudeApiEvent::MessageStart { message } => match message.usage {
                Some(usage) => vec![StreamIncrement::Usage(UsageIncrement {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cache_write_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
                    cache_read_tokens: usage.cache_read_input_tokens.unwrap_or(0),
                    total_cost: None,
                })],
                None => vec![],
            },
            // Some responses carry initial text on the block start itself.
            ClaudeApiEvent::ContentBlockStart { content_block } => match content_block {
                ContentBlock::Text { text: Some(text) } if !text.is_empty() => {
                    vec![StreamIncrement::text(text)]
                }
                _ => vec![],
            },
            ClaudeApiEvent::ContentBlockDelta { delta } => match delta {
                Delta::TextDelta { text } => vec![StreamIncrement::text(text)],
                Delta::Other => vec![],
            },
            ClaudeApiEvent::MessageDelta { usage } => match usage {
                Some(u) => vec![StreamIncrement::Usage(UsageIncrement {
                    output_tokens: u.output_tokens,
                    ..UsageIncrement::default()
                })],
                None => vec![],
            },
            ClaudeApiEvent::Error { error } => {
                let kind = error.error_type.unwrap_or_else(|| "error".to_string());
                return Err(AdapterError::Provider(format!("{}: {}", kind, error.message)));
            }
            ClaudeApiEvent::Unknown => vec![],
        };

        Ok(increments)
    }

    fn reset(&mut self) {
        self.events_seen = 0;
    }
}
