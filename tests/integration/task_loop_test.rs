//! Task Loop Integration Tests
//!
//! Drives the controller end to end against a scripted provider and host:
//! completion, tool execution, mistake limits, the auto-approval limit,
//! first-chunk retries, stream failures, aborts and context truncation.

use std::time::Duration;

use taskloop::services::task::prompts::{
    EMPTY_RESPONSE_PLACEHOLDER, RESPONSE_INTERRUPTED_BY_API_ERROR, RESPONSE_INTERRUPTED_BY_USER,
};
use taskloop::services::task::{Ask, AskResponse, SayKind, TaskState, TaskStatus};
use taskloop::services::history::persistence::load_history;
use taskloop::services::{TaskOutcome, TaskSession};
use taskloop::utils::paths::{task_dir, HISTORY_FILE_NAME, METADATA_FILE_NAME};
use taskloop::AppError;
use taskloop_core::{ContentBlock, DeletedRange, Role};
use taskloop_llm::LlmError;
use tempfile::TempDir;

use super::support::{
    completion, controller, new_scope, test_config, text, texts, tool_results, usage,
    RecordingHost, Reply, ScriptedProvider,
};

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_completion_accepted_finishes_task() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![
        text(&format!("All set.\n{}", completion("Done"))),
        usage(1200),
    ])]);
    let host = RecordingHost::new(vec![]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );

    let outcome = controller.start_task("say hi", Vec::new()).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            result: "Done".to_string()
        }
    );
    assert_eq!(
        host.asks(),
        vec![Ask::CompletionResult {
            result: "Done".to_string()
        }]
    );
    assert_eq!(host.says_of(SayKind::CompletionResult), vec!["Done".to_string()]);

    let state = controller.state().unwrap().clone();
    assert_eq!(state.status, TaskStatus::Completed);
    assert!(state.end_time.is_some());

    let messages = controller.history().unwrap().messages().unwrap().to_vec();
    assert_eq!(messages.len(), 3);
    assert!(texts(&messages[0])[0].contains("<task>\nsay hi\n</task>"));
    assert_eq!(messages[1].role, Role::Assistant);
    let completion_id = messages[1].tool_uses()[0].0.to_string();
    assert_eq!(
        tool_results(&messages[2]),
        vec![(completion_id, String::new(), false)]
    );

    controller.dispose().await;
    assert!(controller.is_disposed());

    let dir = task_dir(store.path(), &state.id);
    let saved = load_history(&dir.join(HISTORY_FILE_NAME)).await.unwrap();
    assert_eq!(saved.messages.len(), 3);
    let metadata: TaskState =
        serde_json::from_slice(&std::fs::read(dir.join(METADATA_FILE_NAME)).unwrap()).unwrap();
    assert_eq!(metadata.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_controller_runs_one_task() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![text(&completion("Done"))])]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider,
        RecordingHost::new(vec![]),
        new_scope().await,
    );

    controller.start_task("first", Vec::new()).await.unwrap();
    let second = controller.start_task("second", Vec::new()).await;
    assert!(matches!(second, Err(AppError::InvalidState(_))));

    controller.dispose().await;
    controller.dispose().await;
}

// ============================================================================
// Tools
// ============================================================================

#[tokio::test]
async fn test_read_file_result_feeds_next_turn() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("notes.txt"), "hello world\n").unwrap();

    let provider = ScriptedProvider::new(vec![
        Reply::Stream(vec![text(
            "Let me read it.\n<read_file>\n<path>notes.txt</path>\n</read_file>",
        )]),
        Reply::Stream(vec![text(&completion("It says hello"))]),
    ]);
    let host = RecordingHost::new(vec![]);
    let mut config = test_config(store.path());
    config.auto_approval.enabled = true;

    let mut controller = controller(
        config,
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );
    let outcome = controller.start_task("read notes", Vec::new()).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));

    // read_file was auto-approved, so only the completion was asked about.
    assert!(host
        .asks()
        .iter()
        .all(|ask| matches!(ask, Ask::CompletionResult { .. })));
    assert!(host.says_of(SayKind::ToolResult)[0].contains("hello world"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let sent = &requests[1].messages;
    assert_eq!(sent.len(), 3);
    let (tool_id, name, params) = sent[1].tool_uses()[0];
    assert_eq!(name, "read_file");
    assert_eq!(params.get("path").map(String::as_str), Some("notes.txt"));

    let results = tool_results(&sent[2]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, tool_id);
    assert!(results[0].1.contains("hello world"));
    assert!(!results[0].2);

    let metrics = &controller.state().unwrap().metrics;
    assert_eq!(metrics.requests, 2);
    assert_eq!(metrics.tool_calls, 2);
    assert_eq!(metrics.tool_failures, 0);
    controller.dispose().await;
}

#[tokio::test]
async fn test_rejected_tool_is_not_run() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Stream(vec![text(
            "<write_to_file>\n<path>out.txt</path>\n<content>data</content>\n</write_to_file>",
        )]),
        Reply::Stream(vec![text(&completion("Skipped the write"))]),
    ]);
    let host = RecordingHost::new(vec![AskResponse::No]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );

    controller.start_task("write a file", Vec::new()).await.unwrap();
    assert!(!workspace.path().join("out.txt").exists());
    assert!(matches!(&host.asks()[0], Ask::Tool { name, .. } if name == "write_to_file"));

    let sent = &provider.requests()[1].messages;
    let results = tool_results(&sent[2]);
    assert_eq!(results[0].1, "The user denied this operation.");
    assert!(results[0].2);
    controller.dispose().await;
}

// ============================================================================
// Mistakes
// ============================================================================

fn no_tool_replies() -> Vec<Reply> {
    vec![
        Reply::Stream(vec![usage(10)]),
        Reply::Stream(vec![text("Thinking about it.")]),
        Reply::Stream(vec![text("Still thinking.")]),
    ]
}

#[tokio::test]
async fn test_mistake_limit_declined_fails_task() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(no_tool_replies());
    let host = RecordingHost::new(vec![AskResponse::No]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );

    let outcome = controller.start_task("think", Vec::new()).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Failed {
            reason: "3 consecutive mistakes".to_string()
        }
    );
    assert_eq!(host.asks(), vec![Ask::MistakeLimitReached { count: 3 }]);
    assert_eq!(provider.requests().len(), 3);
    assert_eq!(controller.state().unwrap().status, TaskStatus::Failed);

    let messages = controller.history().unwrap().messages().unwrap().to_vec();
    assert_eq!(messages.len(), 6);
    assert_eq!(texts(&messages[1]), vec![EMPTY_RESPONSE_PLACEHOLDER.to_string()]);
    assert!(texts(&messages[2])[0].starts_with("[ERROR] You did not use a tool"));
    controller.dispose().await;
}

#[tokio::test]
async fn test_mistake_limit_guidance_is_sent_to_model() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let mut replies = no_tool_replies();
    replies.push(Reply::Stream(vec![text(&completion("Found it"))]));
    let provider = ScriptedProvider::new(replies);
    let host = RecordingHost::new(vec![AskResponse::Message("Look at notes.txt".to_string())]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host,
        new_scope().await,
    );

    let outcome = controller.start_task("think", Vec::new()).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));

    let requests = provider.requests();
    assert_eq!(requests.len(), 4);
    let last_user = requests[3].messages.last().unwrap();
    let guidance = texts(last_user)
        .into_iter()
        .find(|t| t.starts_with("You seem to be having trouble"))
        .unwrap();
    assert!(guidance.contains("Look at notes.txt"));
    controller.dispose().await;
}

// ============================================================================
// Provider failures
// ============================================================================

#[tokio::test]
async fn test_first_chunk_failure_declined_pauses_task() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Fail(LlmError::NetworkError {
        message: "connection reset".to_string(),
    })]);
    let host = RecordingHost::new(vec![AskResponse::No]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );

    let outcome = controller.start_task("anything", Vec::new()).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Interrupted {
            reason: "Network error: connection reset".to_string()
        }
    );
    assert_eq!(
        host.asks(),
        vec![Ask::ApiRequestFailed {
            error: "Network error: connection reset".to_string(),
            attempt: 1,
        }]
    );
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(controller.state().unwrap().status, TaskStatus::Paused);
    assert_eq!(host.says_of(SayKind::Error).len(), 1);
    controller.dispose().await;
}

#[tokio::test]
async fn test_first_chunk_failure_retried_when_approved() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Fail(LlmError::ServerError {
            message: "overloaded".to_string(),
            status: Some(529),
        }),
        Reply::Stream(vec![text(&completion("Done"))]),
    ]);
    let host = RecordingHost::new(vec![AskResponse::Yes]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host,
        new_scope().await,
    );

    let outcome = controller.start_task("anything", Vec::new()).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages, requests[1].messages);
    controller.dispose().await;
}

#[tokio::test]
async fn test_mid_stream_error_records_partial_response() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![
        text("Let me check the "),
        Err(LlmError::NetworkError {
            message: "stream reset".to_string(),
        }),
    ])]);
    let host = RecordingHost::new(vec![]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider,
        host.clone(),
        new_scope().await,
    );

    let outcome = controller.start_task("check", Vec::new()).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Interrupted {
            reason: "Network error: stream reset".to_string()
        }
    );
    // A failure after content started is never offered for retry.
    assert!(host.asks().is_empty());

    let messages = controller.history().unwrap().messages().unwrap().to_vec();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        texts(&messages[1]),
        vec![
            "Let me check the".to_string(),
            RESPONSE_INTERRUPTED_BY_API_ERROR.to_string()
        ]
    );
    assert_eq!(controller.state().unwrap().status, TaskStatus::Paused);
    controller.dispose().await;
}

// ============================================================================
// Auto-approval limit
// ============================================================================

fn read_notes() -> Reply {
    Reply::Stream(vec![text("<read_file>\n<path>notes.txt</path>\n</read_file>")])
}

#[tokio::test]
async fn test_auto_approval_limit_declined_fails_task() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("notes.txt"), "hello\n").unwrap();

    let provider = ScriptedProvider::new(vec![read_notes()]);
    let host = RecordingHost::new(vec![AskResponse::No]);
    let mut config = test_config(store.path());
    config.auto_approval.enabled = true;
    config.auto_approval.max_requests = 1;

    let mut controller = controller(
        config,
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );
    let outcome = controller.start_task("read notes", Vec::new()).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Failed {
            reason: "1 auto-approved requests reached".to_string()
        }
    );
    assert_eq!(host.asks(), vec![Ask::AutoApprovalMaxReached { count: 1 }]);
    // The limit is checked before the next request goes out.
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(controller.state().unwrap().status, TaskStatus::Failed);
    controller.dispose().await;
}

#[tokio::test]
async fn test_auto_approval_limit_accepted_resets_count() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("notes.txt"), "hello\n").unwrap();

    let provider = ScriptedProvider::new(vec![
        read_notes(),
        read_notes(),
        read_notes(),
        Reply::Stream(vec![text(&completion("Read it three times"))]),
    ]);
    let host = RecordingHost::new(vec![AskResponse::Yes]);
    let mut config = test_config(store.path());
    config.auto_approval.enabled = true;
    config.auto_approval.max_requests = 2;

    let mut controller = controller(
        config,
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );
    let outcome = controller.start_task("read notes", Vec::new()).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));

    // Asked once after the second read; the third read starts a fresh count.
    assert_eq!(
        host.asks(),
        vec![
            Ask::AutoApprovalMaxReached { count: 2 },
            Ask::CompletionResult {
                result: "Read it three times".to_string()
            },
        ]
    );
    assert_eq!(provider.requests().len(), 4);
    controller.dispose().await;
}

// ============================================================================
// Abort and abandonment
// ============================================================================

#[tokio::test]
async fn test_abort_during_stream_records_partial_response() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Hang(vec![text("Working on it")])]);
    let host = RecordingHost::new(vec![]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );

    let abort = controller.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        abort.abort();
    });

    let outcome = controller.start_task("long job", Vec::new()).await.unwrap();
    assert_eq!(outcome, TaskOutcome::Aborted);
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(controller.state().unwrap().status, TaskStatus::Aborted);

    let messages = controller.history().unwrap().messages().unwrap().to_vec();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        texts(&messages[1]),
        vec![
            "Working on it".to_string(),
            RESPONSE_INTERRUPTED_BY_USER.to_string()
        ]
    );
    controller.dispose().await;
}

#[tokio::test]
async fn test_abort_while_retry_prompt_unanswered() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Fail(LlmError::NetworkError {
        message: "connection reset".to_string(),
    })]);
    let host = RecordingHost::new(vec![]).silent_on_retry();
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
        new_scope().await,
    );

    let abort = controller.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        controller.start_task("anything", Vec::new()),
    )
    .await
    .expect("abort not observed while the retry prompt was open")
    .unwrap();
    assert_eq!(outcome, TaskOutcome::Aborted);
    assert!(matches!(
        host.asks().as_slice(),
        [Ask::ApiRequestFailed { attempt: 1, .. }]
    ));
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(controller.state().unwrap().status, TaskStatus::Aborted);
    controller.dispose().await;
}

#[tokio::test]
async fn test_abandoned_instance_writes_nothing_more() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Hang(vec![text("Working on it")])]);
    let session = TaskSession::new();
    let scope = session.begin().await;
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider,
        RecordingHost::new(vec![]),
        scope.clone(),
    );

    let takeover = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        takeover.begin().await;
    });

    let result = controller.start_task("long job", Vec::new()).await;
    assert!(matches!(result, Err(AppError::Abandoned)));
    assert!(scope.is_abandoned());

    // Only the user turn that was sent before the takeover.
    let messages = controller.history().unwrap().messages().unwrap().to_vec();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(controller.state().unwrap().status, TaskStatus::Active);
    controller.dispose().await;
}

// ============================================================================
// Truncation
// ============================================================================

/// Runs three no-tool turns, the third reporting `tokens` of usage, then a
/// completion. Returns the stored deleted range and the size of each request.
async fn run_with_final_usage(tokens: u64) -> (Option<DeletedRange>, Vec<usize>) {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Stream(vec![text("one"), usage(1000)]),
        Reply::Stream(vec![text("two"), usage(1000)]),
        Reply::Stream(vec![text("three"), usage(tokens)]),
        Reply::Stream(vec![text(&completion("Done"))]),
    ]);
    let mut config = test_config(store.path());
    config.max_consecutive_mistakes = 10;
    let mut controller = controller(
        config,
        workspace.path(),
        provider.clone(),
        RecordingHost::new(vec![]),
        new_scope().await,
    );

    let outcome = controller.start_task("count", Vec::new()).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));
    let range = controller.history().unwrap().deleted_range();
    controller.dispose().await;

    let sizes = provider
        .requests()
        .iter()
        .map(|r| r.messages.len())
        .collect();
    (range, sizes)
}

#[tokio::test]
async fn test_truncation_triggers_at_exact_ceiling() {
    // 200k window with a 40k reserved tier allows 160k tokens.
    let (range, sizes) = run_with_final_usage(160_000).await;
    assert_eq!(range, Some(DeletedRange::new(2, 3)));
    assert_eq!(sizes, vec![1, 3, 5, 5]);
}

#[tokio::test]
async fn test_no_truncation_below_ceiling() {
    let (range, sizes) = run_with_final_usage(159_999).await;
    assert_eq!(range, None);
    assert_eq!(sizes, vec![1, 3, 5, 7]);
}

#[tokio::test]
async fn test_truncated_history_keeps_first_exchange() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Stream(vec![text("one"), usage(1000)]),
        Reply::Stream(vec![text("two"), usage(1000)]),
        Reply::Stream(vec![text("three"), usage(170_000)]),
        Reply::Stream(vec![text(&completion("Done"))]),
    ]);
    let mut config = test_config(store.path());
    config.max_consecutive_mistakes = 10;
    let mut controller = controller(
        config,
        workspace.path(),
        provider.clone(),
        RecordingHost::new(vec![]),
        new_scope().await,
    );
    controller.start_task("count", Vec::new()).await.unwrap();

    let last = provider.requests().pop().unwrap();
    assert!(texts(&last.messages[0])[0].contains("<task>\ncount\n</task>"));
    assert_eq!(texts(&last.messages[1]), vec!["one".to_string()]);
    assert_eq!(last.messages[2].role, Role::User);
    assert!(last
        .messages
        .iter()
        .all(|m| !m.content.contains(&ContentBlock::text("two"))));
    controller.dispose().await;
}
