//! Resume Integration Tests
//!
//! Saved tasks are written to disk the way an interrupted run leaves them,
//! then resumed through the controller.

use std::collections::BTreeMap;
use std::path::Path;

use taskloop::services::task::prompts::INTERRUPTED_TOOL_RESULT;
use taskloop::services::task::{TaskState, TaskStatus};
use taskloop::services::TaskOutcome;
use taskloop::utils::paths::{task_dir, HISTORY_FILE_NAME, METADATA_FILE_NAME};
use taskloop::AppError;
use taskloop_core::{ContentBlock, ConversationHistoryState, Message};
use tempfile::TempDir;

use super::support::{
    completion, controller, new_scope, test_config, text, texts, tool_results, RecordingHost,
    Reply, ScriptedProvider,
};

fn save_task(tasks_dir: &Path, id: &str, status: TaskStatus, messages: Vec<Message>) {
    let dir = task_dir(tasks_dir, id);
    std::fs::create_dir_all(&dir).unwrap();

    let mut state = TaskState::new(id, "fix the build");
    state.transition(status).unwrap();
    std::fs::write(
        dir.join(METADATA_FILE_NAME),
        serde_json::to_vec_pretty(&state).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join(HISTORY_FILE_NAME),
        serde_json::to_vec(&ConversationHistoryState::new(messages)).unwrap(),
    )
    .unwrap();
}

fn read_params(path: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("path".to_string(), path.to_string())])
}

#[tokio::test]
async fn test_resume_answers_dangling_tool_uses() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    save_task(
        store.path(),
        "task-1",
        TaskStatus::Paused,
        vec![
            Message::user_text("<task>\nfix the build\n</task>"),
            Message::assistant(vec![
                ContentBlock::text("Checking both files"),
                ContentBlock::tool_use("id1", "read_file", read_params("a.rs")),
                ContentBlock::tool_use("id2", "read_file", read_params("b.rs")),
            ]),
        ],
    );

    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![text(&completion("Fixed"))])]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        RecordingHost::new(vec![]),
        new_scope().await,
    );

    let outcome = controller
        .resume_task("task-1", Some("also run the tests"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            result: "Fixed".to_string()
        }
    );

    let sent = &provider.requests()[0].messages;
    assert_eq!(sent.len(), 3);
    assert_eq!(
        tool_results(&sent[2]),
        vec![
            ("id1".to_string(), INTERRUPTED_TOOL_RESULT.to_string(), false),
            ("id2".to_string(), INTERRUPTED_TOOL_RESULT.to_string(), false),
        ]
    );
    let resumption = texts(&sent[2])
        .into_iter()
        .find(|t| t.starts_with("[TASK RESUMPTION]"))
        .unwrap();
    assert!(resumption.contains("also run the tests"));

    let state = controller.state().unwrap();
    assert_eq!(state.id, "task-1");
    assert_eq!(state.status, TaskStatus::Completed);
    controller.dispose().await;
}

#[tokio::test]
async fn test_resume_replaces_unanswered_user_turn() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    save_task(
        store.path(),
        "task-2",
        TaskStatus::Aborted,
        vec![
            Message::user_text("<task>\nfix the build\n</task>"),
            Message::assistant(vec![
                ContentBlock::tool_use("id1", "read_file", read_params("a.rs")),
                ContentBlock::tool_use("id2", "read_file", read_params("b.rs")),
            ]),
            Message::user(vec![
                ContentBlock::tool_result("id1", "fn main() {}"),
                ContentBlock::text("<environment_details>\nstale\n</environment_details>"),
            ]),
        ],
    );

    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![text(&completion("Fixed"))])]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        RecordingHost::new(vec![]),
        new_scope().await,
    );
    controller.resume_task("task-2", None).await.unwrap();

    let sent = &provider.requests()[0].messages;
    assert_eq!(sent.len(), 3);
    assert_eq!(
        tool_results(&sent[2]),
        vec![
            ("id1".to_string(), "fn main() {}".to_string(), false),
            ("id2".to_string(), INTERRUPTED_TOOL_RESULT.to_string(), false),
        ]
    );
    let env_blocks: Vec<String> = texts(&sent[2])
        .into_iter()
        .filter(|t| t.starts_with("<environment_details>"))
        .collect();
    assert_eq!(env_blocks.len(), 1);
    assert!(!env_blocks[0].contains("stale"));
    controller.dispose().await;
}

#[tokio::test]
async fn test_resume_after_stream_error() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    save_task(
        store.path(),
        "task-3",
        TaskStatus::Paused,
        vec![
            Message::user_text("<task>\nfix the build\n</task>"),
            Message::assistant(vec![
                ContentBlock::text("Let me check the"),
                ContentBlock::text("[Response interrupted by API Error]"),
            ]),
        ],
    );

    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![text(&completion("Fixed"))])]);
    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        RecordingHost::new(vec![]),
        new_scope().await,
    );
    controller.resume_task("task-3", None).await.unwrap();

    let sent = &provider.requests()[0].messages;
    assert_eq!(sent.len(), 3);
    assert!(tool_results(&sent[2]).is_empty());
    assert!(texts(&sent[2])[0].starts_with("[TASK RESUMPTION]"));
    controller.dispose().await;
}

#[tokio::test]
async fn test_resume_rejects_finished_and_unknown_tasks() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    save_task(
        store.path(),
        "done",
        TaskStatus::Completed,
        vec![Message::user_text("<task>\nfix the build\n</task>")],
    );

    let mut controller = controller(
        test_config(store.path()),
        workspace.path(),
        ScriptedProvider::new(vec![]),
        RecordingHost::new(vec![]),
        new_scope().await,
    );
    let finished = controller.resume_task("done", None).await;
    assert!(matches!(finished, Err(AppError::InvalidState(_))));

    let unknown = controller.resume_task("missing", None).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
    assert!(controller.state().is_none());
}
