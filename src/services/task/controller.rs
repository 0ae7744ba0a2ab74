//! Task Loop Controller
//!
//! Drives one task: prepares each user turn, streams the model's answer
//! through the request pipeline, runs the tool it asked for through the
//! reliability engine and feeds the result back as the next turn. The loop is
//! iterative over a worklist of pending user content and ends on completion,
//! an interruption the user can resume from, a declined safeguard, or abort.
//!
//! Every suspension point observes the task's [`CancellationScope`]. A user
//! abort still records what streamed so far; an abandoned instance (a newer
//! one took over the session) writes nothing more.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskloop_core::{
    CancellationScope, ContentBlock, ImageSource, Message, StreamIncrement, ToolParams,
    UsageIncrement,
};
use taskloop_llm::{ApiStream, LlmError, ModelRequest, StreamingRequestPipeline};
use taskloop_tools::{
    parse_assistant_message, AssistantBlock, ParseVocabulary, ReliabilityError,
    ToolCallReliabilityEngine, ToolCategory, ToolContext, ToolError, ToolRegistry, ToolResult,
};
use uuid::Uuid;

use super::environment::environment_details;
use super::host::{Ask, AskResponse, HostRetryApprover, SayKind, TaskHost};
use super::prompts;
use super::resume::reconstruct;
use super::state::{TaskOutcome, TaskState};
use super::system_prompt::{
    build_system_prompt, interactive_tool_specs, ASK_FOLLOWUP_QUESTION, ATTEMPT_COMPLETION,
};
use crate::models::settings::AppConfig;
use crate::services::checkpoint::CheckpointTracker;
use crate::services::history::{plan_truncation, ConversationHistoryStore, HistoryView};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_dir, task_dir, HISTORY_FILE_NAME, METADATA_FILE_NAME};

/// Collaborators a controller is built from.
pub struct TaskLoopDeps {
    pub config: AppConfig,
    pub cwd: PathBuf,
    pub pipeline: StreamingRequestPipeline,
    pub tools: Arc<ToolRegistry>,
    pub reliability: Arc<ToolCallReliabilityEngine>,
    pub host: Arc<dyn TaskHost>,
    pub checkpoints: Option<Arc<dyn CheckpointTracker>>,
}

/// Why consumption of a response stream stopped early.
#[derive(Debug, Clone, PartialEq)]
enum Interruption {
    /// A tool ran; only one tool is allowed per message
    ToolUsed,
    /// The user rejected a tool
    Rejected,
    /// The stream failed after content started arriving
    ApiError(String),
    /// The task was aborted or abandoned
    Aborted,
}

/// Tool bookkeeping for the assistant message being streamed.
#[derive(Debug, Default)]
struct TurnTools {
    /// Ids handed out to complete tool blocks, in block order
    ids: Vec<String>,
    /// Content of the next user turn
    results: Vec<ContentBlock>,
    used: bool,
    rejected: bool,
    /// Set once the user accepted an `attempt_completion`
    completed: Option<String>,
}

/// Tracks how much of the parsed assistant message the host has seen.
#[derive(Debug, Default)]
struct Presenter {
    block: usize,
    text_sent: usize,
}

enum Turn {
    Continue(Vec<ContentBlock>),
    Finished(TaskOutcome),
}

/// Text of a still-streaming text block without a half-written trailing tag.
fn visible_text(content: &str, partial: bool) -> &str {
    if !partial {
        return content;
    }
    match content.rfind('<') {
        Some(idx)
            if content[idx + 1..]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/') =>
        {
            content[..idx].trim_end()
        }
        _ => content,
    }
}

fn add_usage(total: &mut UsageIncrement, usage: &UsageIncrement) {
    total.input_tokens += usage.input_tokens;
    total.output_tokens += usage.output_tokens;
    total.cache_write_tokens += usage.cache_write_tokens;
    total.cache_read_tokens += usage.cache_read_tokens;
    total.total_cost = Some(total.total_cost.unwrap_or(0.0) + usage.total_cost.unwrap_or(0.0));
}

/// Assistant content to store: text plus every complete tool block that was
/// handed an id, optionally closed by an interruption marker.
fn assistant_content(
    blocks: &[AssistantBlock],
    ids: &[String],
    marker: Option<&str>,
) -> Vec<ContentBlock> {
    let mut content = Vec::new();
    let mut tool_index = 0;
    for block in blocks {
        match block {
            AssistantBlock::Text { content: text, .. } => {
                content.push(ContentBlock::text(text.clone()));
            }
            AssistantBlock::ToolUse {
                name,
                params,
                partial: false,
            } => {
                if let Some(id) = ids.get(tool_index) {
                    content.push(ContentBlock::tool_use(id.clone(), name.clone(), params.clone()));
                }
                tool_index += 1;
            }
            AssistantBlock::ToolUse { partial: true, .. } => {}
        }
    }
    if let Some(marker) = marker {
        content.push(ContentBlock::text(marker));
    }
    content
}

pub struct TaskLoopController {
    config: AppConfig,
    cwd: PathBuf,
    pipeline: StreamingRequestPipeline,
    tools: Arc<ToolRegistry>,
    reliability: Arc<ToolCallReliabilityEngine>,
    host: Arc<dyn TaskHost>,
    checkpoints: Option<Arc<dyn CheckpointTracker>>,
    scope: CancellationScope,
    vocab: ParseVocabulary,
    system_prompt: String,
    state: Option<TaskState>,
    history: Option<ConversationHistoryStore>,
    consecutive_mistakes: u32,
    auto_approved_requests: u32,
    last_request_usage: Option<UsageIncrement>,
    disposed: bool,
}

impl TaskLoopController {
    pub fn new(deps: TaskLoopDeps, scope: CancellationScope) -> Self {
        let mut specs = deps.tools.specs();
        specs.extend(interactive_tool_specs());
        let vocab = ParseVocabulary::from_specs(specs.iter());
        let system_prompt = build_system_prompt(&deps.cwd, &specs);

        Self {
            config: deps.config,
            cwd: deps.cwd,
            pipeline: deps.pipeline,
            tools: deps.tools,
            reliability: deps.reliability,
            host: deps.host,
            checkpoints: deps.checkpoints,
            scope,
            vocab,
            system_prompt,
            state: None,
            history: None,
            consecutive_mistakes: 0,
            auto_approved_requests: 0,
            last_request_usage: None,
            disposed: false,
        }
    }

    /// Snapshot of the running task, if one was started.
    pub fn state(&self) -> Option<&TaskState> {
        self.state.as_ref()
    }

    pub fn history(&self) -> Option<&ConversationHistoryStore> {
        self.history.as_ref()
    }

    /// Clone of the scope; aborting it stops the loop at its next
    /// suspension point.
    pub fn abort_handle(&self) -> CancellationScope {
        self.scope.clone()
    }

    pub fn abort(&self) {
        tracing::info!(task_id = self.task_id(), "abort requested");
        self.scope.abort();
    }

    fn task_id(&self) -> &str {
        self.state.as_ref().map(|s| s.id.as_str()).unwrap_or("")
    }

    fn ensure_idle(&self) -> AppResult<()> {
        if self.disposed {
            return Err(AppError::invalid_state("controller has been disposed"));
        }
        if self.state.is_some() {
            return Err(AppError::invalid_state("a task is already active"));
        }
        Ok(())
    }

    fn state_mut(&mut self) -> AppResult<&mut TaskState> {
        self.state
            .as_mut()
            .ok_or_else(|| AppError::invalid_state("no active task"))
    }

    fn history_mut(&mut self) -> AppResult<&mut ConversationHistoryStore> {
        self.history
            .as_mut()
            .ok_or_else(|| AppError::invalid_state("no active task"))
    }

    fn history_ref(&self) -> AppResult<&ConversationHistoryStore> {
        self.history
            .as_ref()
            .ok_or_else(|| AppError::invalid_state("no active task"))
    }

    fn task_dir(&self, task_id: &str) -> AppResult<PathBuf> {
        Ok(task_dir(&self.config.resolved_tasks_dir()?, task_id))
    }

    async fn open_history(&self, dir: &Path) -> AppResult<ConversationHistoryStore> {
        ensure_dir(dir)?;
        let debounce = Duration::from_millis(self.config.history_write_debounce_ms);
        Ok(ConversationHistoryStore::open(dir.join(HISTORY_FILE_NAME), debounce).await?)
    }

    /// Start a new task and run it until it ends.
    pub async fn start_task(
        &mut self,
        task: &str,
        images: Vec<ImageSource>,
    ) -> AppResult<TaskOutcome> {
        self.ensure_idle()?;
        let id = Uuid::new_v4().to_string();
        let dir = self.task_dir(&id)?;
        let history = self.open_history(&dir).await?;

        tracing::info!(task_id = %id, cwd = %self.cwd.display(), "starting task");
        self.state = Some(TaskState::new(id, task));
        self.history = Some(history);
        self.write_metadata();

        let mut content = vec![ContentBlock::text(prompts::task_message(task))];
        content.extend(images.into_iter().map(|source| ContentBlock::Image { source }));
        self.run_loop(content).await
    }

    /// Resume a saved task, optionally with new instructions from the user.
    pub async fn resume_task(
        &mut self,
        task_id: &str,
        feedback: Option<&str>,
    ) -> AppResult<TaskOutcome> {
        self.ensure_idle()?;
        let dir = self.task_dir(task_id)?;
        let metadata_path = dir.join(METADATA_FILE_NAME);
        let previous: TaskState = match std::fs::read(&metadata_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!("task {}", task_id)))
            }
            Err(e) => return Err(e.into()),
        };
        let state = TaskState::resumed_from(&previous)?;
        let mut history = self.open_history(&dir).await?;

        let plan = reconstruct(
            history.messages()?.to_vec(),
            previous.updated_at,
            Utc::now(),
            &self.cwd.display().to_string(),
            feedback,
        )?;
        history.overwrite_history(plan.history)?;

        tracing::info!(
            task_id,
            previous_status = %previous.status,
            messages = history.len(),
            "resuming task"
        );
        self.state = Some(state);
        self.history = Some(history);
        self.write_metadata();
        self.run_loop(plan.next_user_content).await
    }

    async fn run_loop(&mut self, initial: Vec<ContentBlock>) -> AppResult<TaskOutcome> {
        let mut worklist = VecDeque::from([initial]);
        let mut first_turn = true;

        let outcome = loop {
            let Some(content) = worklist.pop_front() else {
                break TaskOutcome::Interrupted {
                    reason: "no further input".to_string(),
                };
            };
            match self.run_turn(content, first_turn).await {
                Ok(Turn::Continue(next)) => worklist.push_back(next),
                Ok(Turn::Finished(outcome)) => break outcome,
                Err(AppError::Aborted) => break TaskOutcome::Aborted,
                Err(e) => {
                    if !matches!(e, AppError::Abandoned) {
                        tracing::error!(task_id = self.task_id(), error = %e, "task loop failed");
                    }
                    return Err(e);
                }
            }
            first_turn = false;
        };

        self.finish(outcome).await
    }

    async fn finish(&mut self, outcome: TaskOutcome) -> AppResult<TaskOutcome> {
        if self.scope.is_abandoned() {
            return Err(AppError::Abandoned);
        }
        let state = self.state_mut()?;
        state.transition(outcome.status())?;
        let (task_id, status, cost) = (state.id.clone(), state.status, state.metrics.total_cost);
        tracing::info!(
            task_id = %task_id,
            status = %status,
            total_cost = cost,
            "task loop finished"
        );

        self.write_metadata();
        if let Err(e) = self.history_ref()?.flush().await {
            tracing::warn!(task_id = %task_id, error = %e, "history not synced at end of run");
        }
        Ok(outcome)
    }

    fn cancellation_error(&self) -> AppError {
        if self.scope.is_abandoned() {
            AppError::Abandoned
        } else {
            AppError::Aborted
        }
    }

    async fn ask(&self, ask: Ask) -> AppResult<AskResponse> {
        if self.scope.is_aborted() {
            return Err(self.cancellation_error());
        }
        let scope = self.scope.clone();
        let response = tokio::select! {
            biased;
            _ = scope.cancelled() => None,
            response = self.host.ask(ask) => Some(response),
        };
        match response {
            Some(response) if !self.scope.is_aborted() => Ok(response),
            _ => Err(self.cancellation_error()),
        }
    }

    async fn say(&self, kind: SayKind, text: &str, partial: bool) {
        if self.scope.is_abandoned() {
            return;
        }
        self.host.say(kind, text, partial).await;
    }

    /// One user turn and the assistant's answer to it.
    async fn run_turn(
        &mut self,
        mut user_content: Vec<ContentBlock>,
        include_file_listing: bool,
    ) -> AppResult<Turn> {
        if self.scope.is_aborted() {
            return Err(self.cancellation_error());
        }

        if self.consecutive_mistakes >= self.config.max_consecutive_mistakes {
            let count = self.consecutive_mistakes;
            match self.ask(Ask::MistakeLimitReached { count }).await? {
                AskResponse::No => {
                    return Ok(Turn::Finished(TaskOutcome::Failed {
                        reason: format!("{} consecutive mistakes", count),
                    }))
                }
                AskResponse::Message(feedback) => {
                    user_content.push(ContentBlock::text(prompts::too_many_mistakes(Some(
                        &feedback,
                    ))));
                }
                AskResponse::Yes => {}
            }
            self.consecutive_mistakes = 0;
        }

        let auto_approval = &self.config.auto_approval;
        if auto_approval.enabled && self.auto_approved_requests >= auto_approval.max_requests {
            let count = self.auto_approved_requests;
            if self.ask(Ask::AutoApprovalMaxReached { count }).await? == AskResponse::No {
                return Ok(Turn::Finished(TaskOutcome::Failed {
                    reason: format!("{} auto-approved requests reached", count),
                }));
            }
            self.auto_approved_requests = 0;
        }

        user_content.push(ContentBlock::text(environment_details(
            &self.cwd,
            include_file_listing,
        )));
        self.history_mut()?.add_message(Message::user(user_content))?;
        self.truncate_if_needed()?;

        self.say(SayKind::ApiRequestStarted, "", false).await;
        let request = ModelRequest::new(
            self.system_prompt.clone(),
            self.history_ref()?.get_current_history(HistoryView::ForModel)?,
        );
        self.state_mut()?.metrics.requests += 1;

        let approver = HostRetryApprover::new(self.host.clone());
        let stream = match self
            .pipeline
            .attempt_request(request, &self.scope, &approver)
            .await
        {
            Ok(stream) => stream,
            Err(LlmError::Cancelled) => return Err(self.cancellation_error()),
            Err(e) => {
                if self.scope.is_aborted() {
                    return Err(self.cancellation_error());
                }
                tracing::warn!(
                    task_id = self.task_id(),
                    error = %e,
                    "request failed before streaming"
                );
                self.say(SayKind::Error, &e.to_string(), false).await;
                return Ok(Turn::Finished(TaskOutcome::Interrupted {
                    reason: e.to_string(),
                }));
            }
        };

        self.consume_stream(stream).await
    }

    fn truncate_if_needed(&mut self) -> AppResult<()> {
        let Some(usage) = self.last_request_usage else {
            return Ok(());
        };
        let max_allowed = self
            .config
            .context_window
            .max_allowed_tokens(self.pipeline.model_info().context_window);
        let history = self.history_mut()?;
        let next = plan_truncation(
            history.messages()?,
            history.deleted_range(),
            &usage,
            max_allowed,
        );
        if let Some(range) = next {
            history.set_deleted_range(Some(range))?;
        }
        Ok(())
    }

    async fn consume_stream(&mut self, mut stream: ApiStream) -> AppResult<Turn> {
        let scope = self.scope.clone();
        let mut text = String::new();
        let mut blocks: Vec<AssistantBlock> = Vec::new();
        let mut presenter = Presenter::default();
        let mut turn = TurnTools::default();
        let mut usage = UsageIncrement::default();
        let mut interruption = None;

        while interruption.is_none() {
            let item = tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    interruption = Some(Interruption::Aborted);
                    break;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(StreamIncrement::Usage(increment))) => {
                    add_usage(&mut usage, &increment);
                    self.state_mut()?.metrics.record_usage(&increment);
                }
                Some(Ok(StreamIncrement::Text { text: delta })) => {
                    text.push_str(&delta);
                    blocks = parse_assistant_message(&text, &self.vocab);
                    interruption = match self.present(&blocks, &mut presenter, &mut turn).await {
                        Ok(interruption) => interruption,
                        Err(e) if e.is_cancellation() => Some(Interruption::Aborted),
                        Err(e) => return Err(e),
                    };
                }
                Some(Err(LlmError::Cancelled)) => interruption = Some(Interruption::Aborted),
                Some(Err(e)) => interruption = Some(Interruption::ApiError(e.to_string())),
                None => break,
            }

            if interruption.is_none() && scope.is_aborted() {
                interruption = Some(Interruption::Aborted);
            }
        }

        if stream.is_open() {
            stream.release(&scope);
        }
        self.last_request_usage = Some(usage);
        tracing::info!(
            task_id = self.task_id(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = usage.total_cost.unwrap_or(0.0),
            interruption = ?interruption,
            "model response finished"
        );

        // The stream ended on its own, so whatever is still open is complete.
        if interruption.is_none() {
            for block in blocks.iter_mut() {
                match block {
                    AssistantBlock::Text { partial, .. }
                    | AssistantBlock::ToolUse { partial, .. } => *partial = false,
                }
            }
            match self.present(&blocks, &mut presenter, &mut turn).await {
                Ok(found) => interruption = found,
                Err(e) if e.is_cancellation() => interruption = Some(Interruption::Aborted),
                Err(e) => return Err(e),
            }
        }

        match interruption {
            Some(Interruption::Aborted) => self.stop_on_abort(&blocks, &turn).await,
            Some(Interruption::ApiError(error)) => {
                self.stop_on_stream_error(&blocks, &turn, error).await
            }
            Some(Interruption::ToolUsed) => {
                self.skip_remaining_tools(&blocks, &mut presenter, &mut turn);
                self.complete_turn(&blocks, turn, Some(prompts::RESPONSE_INTERRUPTED_BY_TOOL_USE))
            }
            Some(Interruption::Rejected) => {
                self.skip_remaining_tools(&blocks, &mut presenter, &mut turn);
                self.complete_turn(&blocks, turn, Some(prompts::RESPONSE_INTERRUPTED_BY_FEEDBACK))
            }
            None => self.complete_turn(&blocks, turn, None),
        }
    }

    /// Show new text to the host and run any tool block that just completed.
    async fn present(
        &mut self,
        blocks: &[AssistantBlock],
        presenter: &mut Presenter,
        turn: &mut TurnTools,
    ) -> AppResult<Option<Interruption>> {
        while let Some(block) = blocks.get(presenter.block) {
            match block {
                AssistantBlock::Text { content, partial } => {
                    let shown = visible_text(content, *partial);
                    let delta = shown.get(presenter.text_sent..).unwrap_or("");
                    if !delta.is_empty() || !*partial {
                        self.say(SayKind::Text, delta, *partial).await;
                        presenter.text_sent = presenter.text_sent.max(shown.len());
                    }
                    if *partial {
                        return Ok(None);
                    }
                    presenter.block += 1;
                    presenter.text_sent = 0;
                }
                AssistantBlock::ToolUse { partial: true, .. } => return Ok(None),
                AssistantBlock::ToolUse { name, params, .. } => {
                    presenter.block += 1;
                    if let Some(interruption) = self.handle_tool_use(name, params, turn).await? {
                        return Ok(Some(interruption));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Answer complete tool blocks after the one that interrupted the stream.
    fn skip_remaining_tools(
        &self,
        blocks: &[AssistantBlock],
        presenter: &mut Presenter,
        turn: &mut TurnTools,
    ) {
        while let Some(block) = blocks.get(presenter.block) {
            presenter.block += 1;
            if let AssistantBlock::ToolUse {
                name,
                partial: false,
                ..
            } = block
            {
                let id = new_tool_use_id();
                let text = if turn.rejected {
                    prompts::tool_skipped_after_rejection(name)
                } else {
                    prompts::tool_not_executed(name)
                };
                turn.results.push(ContentBlock::tool_error(id.clone(), text));
                turn.ids.push(id);
            }
        }
    }

    fn complete_turn(
        &mut self,
        blocks: &[AssistantBlock],
        turn: TurnTools,
        marker: Option<&str>,
    ) -> AppResult<Turn> {
        let content = assistant_content(blocks, &turn.ids, marker);
        let empty = !content.iter().any(|b| match b {
            ContentBlock::Text { text } => !text.trim().is_empty(),
            _ => true,
        });

        if empty {
            tracing::warn!(task_id = self.task_id(), "model returned an empty response");
            self.history_mut()?.add_message(Message::assistant(vec![ContentBlock::text(
                prompts::EMPTY_RESPONSE_PLACEHOLDER,
            )]))?;
            self.consecutive_mistakes += 1;
            return Ok(Turn::Continue(vec![ContentBlock::text(prompts::no_tools_used())]));
        }

        self.history_mut()?.add_message(Message::assistant(content))?;

        if let Some(result) = turn.completed {
            self.history_mut()?.add_message(Message::user(turn.results))?;
            return Ok(Turn::Finished(TaskOutcome::Completed { result }));
        }

        if turn.ids.is_empty() {
            self.consecutive_mistakes += 1;
            tracing::debug!(
                task_id = self.task_id(),
                mistakes = self.consecutive_mistakes,
                "response used no tool"
            );
            return Ok(Turn::Continue(vec![ContentBlock::text(prompts::no_tools_used())]));
        }
        Ok(Turn::Continue(turn.results))
    }

    async fn stop_on_stream_error(
        &mut self,
        blocks: &[AssistantBlock],
        turn: &TurnTools,
        error: String,
    ) -> AppResult<Turn> {
        tracing::warn!(task_id = self.task_id(), error = %error, "stream failed mid-response");
        let content = assistant_content(
            blocks,
            &turn.ids,
            Some(prompts::RESPONSE_INTERRUPTED_BY_API_ERROR),
        );
        self.history_mut()?.add_message(Message::assistant(content))?;
        if let Err(e) = self.host.revert_pending_edits().await {
            tracing::warn!(task_id = self.task_id(), error = %e, "failed to revert pending edits");
        }
        self.say(SayKind::Error, &error, false).await;
        Ok(Turn::Finished(TaskOutcome::Interrupted { reason: error }))
    }

    async fn stop_on_abort(
        &mut self,
        blocks: &[AssistantBlock],
        turn: &TurnTools,
    ) -> AppResult<Turn> {
        if self.scope.is_abandoned() {
            tracing::debug!(task_id = self.task_id(), "abandoned instance stops without writing");
            return Err(AppError::Abandoned);
        }
        let content = assistant_content(
            blocks,
            &turn.ids,
            Some(prompts::RESPONSE_INTERRUPTED_BY_USER),
        );
        self.history_mut()?.add_message(Message::assistant(content))?;
        if let Err(e) = self.host.revert_pending_edits().await {
            tracing::warn!(task_id = self.task_id(), error = %e, "failed to revert pending edits");
        }
        Err(AppError::Aborted)
    }

    async fn handle_tool_use(
        &mut self,
        name: &str,
        params: &ToolParams,
        turn: &mut TurnTools,
    ) -> AppResult<Option<Interruption>> {
        let id = new_tool_use_id();
        turn.ids.push(id.clone());

        if turn.rejected {
            turn.results.push(ContentBlock::tool_error(
                id,
                prompts::tool_skipped_after_rejection(name),
            ));
            return Ok(None);
        }
        if turn.used {
            turn.results
                .push(ContentBlock::tool_error(id, prompts::tool_not_executed(name)));
            return Ok(None);
        }
        turn.used = true;
        self.state_mut()?.metrics.tool_calls += 1;

        match name {
            ATTEMPT_COMPLETION => self.attempt_completion(id, params, turn).await,
            ASK_FOLLOWUP_QUESTION => self.ask_followup_question(id, params, turn).await,
            _ => self.run_tool(id, name, params, turn).await,
        }
    }

    fn record_missing_param(&mut self, id: String, param: &str, turn: &mut TurnTools) {
        let content = ToolResult::from(ToolError::missing_parameter(param)).to_content();
        turn.results.push(ContentBlock::tool_error(id, content));
        self.consecutive_mistakes += 1;
    }

    async fn attempt_completion(
        &mut self,
        id: String,
        params: &ToolParams,
        turn: &mut TurnTools,
    ) -> AppResult<Option<Interruption>> {
        let Some(result) = params.get("result").filter(|r| !r.trim().is_empty()).cloned() else {
            self.record_missing_param(id, "result", turn);
            return Ok(Some(Interruption::ToolUsed));
        };
        self.consecutive_mistakes = 0;
        self.say(SayKind::CompletionResult, &result, false).await;

        let content = match self
            .ask(Ask::CompletionResult {
                result: result.clone(),
            })
            .await?
        {
            AskResponse::Yes => {
                turn.completed = Some(result);
                String::new()
            }
            AskResponse::No => prompts::tool_denied(),
            AskResponse::Message(feedback) => prompts::completion_feedback(&feedback),
        };
        turn.results.push(ContentBlock::tool_result(id, content));
        Ok(Some(Interruption::ToolUsed))
    }

    async fn ask_followup_question(
        &mut self,
        id: String,
        params: &ToolParams,
        turn: &mut TurnTools,
    ) -> AppResult<Option<Interruption>> {
        let Some(question) = params.get("question").filter(|q| !q.trim().is_empty()).cloned()
        else {
            self.record_missing_param(id, "question", turn);
            return Ok(Some(Interruption::ToolUsed));
        };
        self.consecutive_mistakes = 0;

        let answer = match self.ask(Ask::Followup { question }).await? {
            AskResponse::Yes => "Yes".to_string(),
            AskResponse::No => "No".to_string(),
            AskResponse::Message(answer) => answer,
        };
        turn.results
            .push(ContentBlock::tool_result(id, prompts::followup_answer(&answer)));
        Ok(Some(Interruption::ToolUsed))
    }

    fn auto_approves(&self, category: ToolCategory) -> bool {
        let settings = &self.config.auto_approval;
        settings.enabled
            && match category {
                ToolCategory::Read => settings.read_files,
                ToolCategory::Edit => settings.edit_files,
                ToolCategory::Execute => settings.execute_commands,
                ToolCategory::Interactive => false,
            }
    }

    async fn run_tool(
        &mut self,
        id: String,
        name: &str,
        params: &ToolParams,
        turn: &mut TurnTools,
    ) -> AppResult<Option<Interruption>> {
        let Some(tool) = self.tools.get(name) else {
            turn.results
                .push(ContentBlock::tool_error(id, format!("Unknown tool: {}", name)));
            self.consecutive_mistakes += 1;
            return Ok(Some(Interruption::ToolUsed));
        };

        let mut feedback = None;
        if self.auto_approves(tool.category()) {
            self.auto_approved_requests += 1;
        } else {
            let ask = Ask::Tool {
                name: name.to_string(),
                params: params.clone(),
            };
            match self.ask(ask).await? {
                AskResponse::Yes => {}
                AskResponse::No => {
                    tracing::info!(task_id = self.task_id(), tool = name, "tool rejected");
                    turn.results
                        .push(ContentBlock::tool_error(id, prompts::tool_denied()));
                    turn.rejected = true;
                    return Ok(Some(Interruption::Rejected));
                }
                AskResponse::Message(text) => feedback = Some(text),
            }
        }

        let ctx = ToolContext::new(self.task_id(), self.cwd.clone(), self.scope.clone());
        let outcome = self
            .reliability
            .execute_cancellable(name, params.clone(), Some(&self.scope), |attempt_params| {
                let tool = tool.clone();
                let ctx = ctx.clone();
                async move { tool.execute(&ctx, &attempt_params).await.into_result() }
            })
            .await;

        if self.scope.is_aborted() {
            return Err(self.cancellation_error());
        }

        match outcome {
            Ok(result) => {
                let mut content = result.to_content();
                if let Some(feedback) = feedback.as_deref() {
                    content.push_str("\n\n");
                    content.push_str(&prompts::tool_approved_with_feedback(feedback));
                }
                self.say(SayKind::ToolResult, &content, false).await;
                turn.results.push(ContentBlock::tool_result(id, content));
                self.consecutive_mistakes = 0;
                if result.side_effect {
                    self.save_checkpoint().await;
                }
            }
            Err(ReliabilityError::Failed {
                report, attempts, ..
            }) => {
                tracing::info!(task_id = self.task_id(), tool = name, attempts, "tool call failed");
                let content = report.to_tool_output();
                self.say(SayKind::ToolResult, &content, false).await;
                turn.results.push(ContentBlock::tool_error(id, content));
                self.consecutive_mistakes += 1;
                self.state_mut()?.metrics.tool_failures += 1;
            }
            Err(ReliabilityError::Cancelled { .. }) => return Err(self.cancellation_error()),
        }
        Ok(Some(Interruption::ToolUsed))
    }

    async fn save_checkpoint(&self) {
        let Some(tracker) = self.checkpoints.as_ref() else {
            return;
        };
        match tracker.save(self.task_id()).await {
            Ok(hash) => tracing::debug!(task_id = self.task_id(), hash = %hash, "checkpoint saved"),
            Err(e) => {
                self.say(SayKind::Warning, &format!("Failed to save checkpoint: {}", e), false)
                    .await
            }
        }
    }

    /// Reset the workspace to a checkpoint. Failures are reported to the host
    /// as warnings; returns whether the restore happened.
    pub async fn restore_checkpoint(&self, hash: &str) -> bool {
        let Some(tracker) = self.checkpoints.as_ref() else {
            self.say(SayKind::Warning, "Checkpoints are not available", false).await;
            return false;
        };
        match tracker.restore(self.task_id(), hash).await {
            Ok(()) => {
                tracing::info!(task_id = self.task_id(), hash, "checkpoint restored");
                true
            }
            Err(e) => {
                self.say(SayKind::Warning, &format!("Failed to restore checkpoint: {}", e), false)
                    .await;
                false
            }
        }
    }

    /// Diff of the workspace since a checkpoint, or `None` after a warning.
    pub async fn checkpoint_diff(&self, hash: &str) -> Option<String> {
        let Some(tracker) = self.checkpoints.as_ref() else {
            self.say(SayKind::Warning, "Checkpoints are not available", false).await;
            return None;
        };
        match tracker.diff(self.task_id(), hash).await {
            Ok(diff) => Some(diff),
            Err(e) => {
                self.say(SayKind::Warning, &format!("Failed to diff checkpoint: {}", e), false)
                    .await;
                None
            }
        }
    }

    /// Best-effort `task_metadata.json` write.
    fn write_metadata(&mut self) {
        if self.scope.is_abandoned() {
            return;
        }
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.touch();
        let written = self
            .config
            .resolved_tasks_dir()
            .and_then(|tasks_dir| {
                let path = task_dir(&tasks_dir, &state.id).join(METADATA_FILE_NAME);
                let json = serde_json::to_vec_pretty(state)?;
                std::fs::write(path, json)?;
                Ok(())
            });
        if let Err(e) = written {
            tracing::warn!(task_id = %state.id, error = %e, "failed to write task metadata");
        }
    }

    /// Release everything the task holds. Each step runs even if an earlier
    /// one failed; calling it again does nothing.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        tracing::debug!(task_id = self.task_id(), "disposing task");

        self.scope.abort();

        for (tool, error) in self.tools.close_all().await {
            tracing::warn!(
                task_id = self.task_id(),
                tool = %tool,
                error = %error,
                "failed to close tool"
            );
        }

        if let Err(e) = self.host.revert_pending_edits().await {
            tracing::warn!(task_id = self.task_id(), error = %e, "failed to revert pending edits");
        }

        self.write_metadata();

        let task_id = self.task_id().to_string();
        if let Some(history) = self.history.as_mut() {
            if let Err(e) = history.flush().await {
                tracing::warn!(task_id = %task_id, error = %e, "history not synced on dispose");
            }
            if let Err(e) = history.dispose().await {
                tracing::warn!(task_id = %task_id, error = %e, "failed to dispose history");
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

fn new_tool_use_id() -> String {
    format!("toolu_{}", Uuid::new_v4().simple())
}
