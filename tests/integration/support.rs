//! Scripted provider and host shared by the task loop tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use taskloop::services::task::{Ask, AskResponse, SayKind, TaskHost};
use taskloop::services::{builtin_registry, TaskLoopController, TaskLoopDeps, TaskSession};
use taskloop::AppConfig;
use taskloop_core::{CancellationScope, ContentBlock, Message, StreamIncrement, UsageIncrement};
use taskloop_llm::{
    IncrementStream, LlmError, LlmResult, ModelInfo, ModelProvider, ModelRequest,
    StreamingRequestPipeline,
};
use taskloop_tools::{ReliabilityConfig, ToolCallReliabilityEngine};

/// One scripted answer to `create_stream`.
pub enum Reply {
    /// Yield these items, then end
    Stream(Vec<LlmResult<StreamIncrement>>),
    /// Yield these items, then never end
    Hang(Vec<LlmResult<StreamIncrement>>),
    /// Fail before any increment
    Fail(LlmError),
}

pub fn text(text: &str) -> LlmResult<StreamIncrement> {
    Ok(StreamIncrement::Text {
        text: text.to_string(),
    })
}

pub fn usage(input_tokens: u64) -> LlmResult<StreamIncrement> {
    Ok(StreamIncrement::Usage(UsageIncrement {
        input_tokens,
        output_tokens: 0,
        ..Default::default()
    }))
}

pub fn completion(result: &str) -> String {
    format!(
        "<attempt_completion>\n<result>{}</result>\n</attempt_completion>",
        result
    )
}

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::for_model("claude-sonnet-4", 8192)
    }

    async fn create_stream(&self, request: ModelRequest) -> LlmResult<IncrementStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider script exhausted");
        match reply {
            Reply::Stream(items) => Ok(stream::iter(items).boxed()),
            Reply::Hang(items) => Ok(stream::iter(items).chain(stream::pending()).boxed()),
            Reply::Fail(error) => Err(error),
        }
    }
}

/// Host answering asks from a script (`Yes` once it runs out) and recording
/// everything it is told.
#[derive(Default)]
pub struct RecordingHost {
    answers: Mutex<VecDeque<AskResponse>>,
    asks: Mutex<Vec<Ask>>,
    says: Mutex<Vec<(SayKind, String, bool)>>,
    reverts: AtomicUsize,
    fail_reverts: AtomicBool,
    /// Leave `ApiRequestFailed` unanswered forever
    silent_on_retry: AtomicBool,
}

impl RecordingHost {
    pub fn new(answers: Vec<AskResponse>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            ..Default::default()
        })
    }

    pub fn silent_on_retry(self: Arc<Self>) -> Arc<Self> {
        self.silent_on_retry.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_reverts(self: Arc<Self>) -> Arc<Self> {
        self.fail_reverts.store(true, Ordering::SeqCst);
        self
    }

    pub fn reverts(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }

    pub fn asks(&self) -> Vec<Ask> {
        self.asks.lock().unwrap().clone()
    }

    pub fn says_of(&self, kind: SayKind) -> Vec<String> {
        self.says
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl TaskHost for RecordingHost {
    async fn ask(&self, ask: Ask) -> AskResponse {
        let retry_prompt = matches!(ask, Ask::ApiRequestFailed { .. });
        self.asks.lock().unwrap().push(ask);
        if retry_prompt && self.silent_on_retry.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AskResponse::Yes)
    }

    async fn say(&self, kind: SayKind, text: &str, partial: bool) {
        self.says
            .lock()
            .unwrap()
            .push((kind, text.to_string(), partial));
    }

    async fn revert_pending_edits(&self) -> Result<(), String> {
        self.reverts.fetch_add(1, Ordering::SeqCst);
        if self.fail_reverts.load(Ordering::SeqCst) {
            return Err("diff view already closed".to_string());
        }
        Ok(())
    }
}

pub fn test_config(tasks_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.tasks_dir = Some(tasks_dir.to_path_buf());
    config.history_write_debounce_ms = 5;
    config
}

pub fn controller(
    config: AppConfig,
    cwd: &Path,
    provider: Arc<ScriptedProvider>,
    host: Arc<RecordingHost>,
    scope: CancellationScope,
) -> TaskLoopController {
    TaskLoopController::new(deps(config, cwd, provider, host), scope)
}

/// Builtin tools, default reliability engine and no checkpoints.
pub fn deps(
    config: AppConfig,
    cwd: &Path,
    provider: Arc<ScriptedProvider>,
    host: Arc<RecordingHost>,
) -> TaskLoopDeps {
    TaskLoopDeps {
        config,
        cwd: cwd.to_path_buf(),
        pipeline: StreamingRequestPipeline::new(provider),
        tools: Arc::new(builtin_registry()),
        reliability: Arc::new(ToolCallReliabilityEngine::with_builtin_strategies(
            ReliabilityConfig::default(),
        )),
        host,
        checkpoints: None,
    }
}

pub async fn new_scope() -> CancellationScope {
    TaskSession::new().begin().await
}

/// Tool results carried by a user message, as (id, content, is_error).
pub fn tool_results(message: &Message) -> Vec<(String, String, bool)> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((tool_use_id.clone(), content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

pub fn texts(message: &Message) -> Vec<String> {
    message
        .content
        .iter()
        .filter_map(|b| b.as_text().map(str::to_string))
        .collect()
}
