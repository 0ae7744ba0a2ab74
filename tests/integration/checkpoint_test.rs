//! Checkpoint and Disposal Integration Tests
//!
//! Checkpoint failures only ever reach the user as warnings, and disposing a
//! controller runs every release step even when some of them fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskloop::services::task::{SayKind, TaskState, TaskStatus};
use taskloop::services::{
    builtin_registry, CheckpointTracker, HistoryError, TaskLoopController, TaskOutcome,
};
use taskloop::utils::paths::{task_dir, METADATA_FILE_NAME};
use taskloop::AppError;
use taskloop_core::ToolParams;
use taskloop_tools::trait_def::required_param;
use taskloop_tools::{Tool, ToolCategory, ToolContext, ToolErrorKind, ToolParameter, ToolResult};
use tempfile::TempDir;

use super::support::{
    completion, deps, new_scope, test_config, text, tool_results, RecordingHost, Reply,
    ScriptedProvider,
};

/// Tracker that either always succeeds or always fails.
struct Checkpoints {
    fail: bool,
    saves: Mutex<Vec<String>>,
}

impl Checkpoints {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            saves: Mutex::new(Vec::new()),
        })
    }

    fn saves(&self) -> Vec<String> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointTracker for Checkpoints {
    async fn save(&self, task_id: &str) -> Result<String, String> {
        self.saves.lock().unwrap().push(task_id.to_string());
        if self.fail {
            return Err("disk full".to_string());
        }
        Ok("3f2a9c1".to_string())
    }

    async fn restore(&self, _task_id: &str, hash: &str) -> Result<(), String> {
        if self.fail {
            return Err(format!("unknown revision {}", hash));
        }
        Ok(())
    }

    async fn diff(&self, _task_id: &str, hash: &str) -> Result<String, String> {
        if self.fail {
            return Err(format!("unknown revision {}", hash));
        }
        Ok("--- a/notes.txt\n+++ b/notes.txt\n".to_string())
    }
}

/// Edit tool that creates empty files and refuses paths without an extension.
/// Closing it always fails.
#[derive(Default)]
struct TouchTool {
    closes: AtomicUsize,
}

#[async_trait]
impl Tool for TouchTool {
    fn name(&self) -> &str {
        "touch_file"
    }

    fn description(&self) -> &str {
        "Create an empty file."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required("path", "File to create")]
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    async fn execute(&self, ctx: &ToolContext, params: &ToolParams) -> ToolResult {
        let path = match required_param(params, "path") {
            Ok(path) => path,
            Err(result) => return result,
        };
        if !path.contains('.') {
            return ToolResult::err_kind(
                ToolErrorKind::InvalidParameter,
                "path must have an extension",
            );
        }
        match std::fs::write(ctx.resolve(path), "") {
            Ok(()) => ToolResult::ok(format!("Created {}", path)).with_side_effect(),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }

    async fn close(&self) -> Result<(), String> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Err("handle still in use".to_string())
    }
}

fn touch(path: &str) -> Reply {
    Reply::Stream(vec![text(&format!(
        "<touch_file>\n<path>{}</path>\n</touch_file>",
        path
    ))])
}

#[tokio::test]
async fn test_checkpoint_saved_only_after_side_effect() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("notes.txt"), "hello\n").unwrap();

    let provider = ScriptedProvider::new(vec![
        touch("README"),
        touch("a.txt"),
        Reply::Stream(vec![text("<read_file>\n<path>notes.txt</path>\n</read_file>")]),
        Reply::Stream(vec![text(&completion("Created a.txt"))]),
    ]);
    let host = RecordingHost::new(vec![]);
    let checkpoints = Checkpoints::new(true);

    let mut tools = builtin_registry();
    tools.register(Arc::new(TouchTool::default()));
    let mut deps = deps(
        test_config(store.path()),
        workspace.path(),
        provider.clone(),
        host.clone(),
    );
    deps.tools = Arc::new(tools);
    deps.checkpoints = Some(checkpoints.clone());
    let mut controller = TaskLoopController::new(deps, new_scope().await);

    let outcome = controller.start_task("create a.txt", Vec::new()).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            result: "Created a.txt".to_string()
        }
    );
    assert!(workspace.path().join("a.txt").exists());

    // The rejected path and the read changed nothing, so only one save.
    let task_id = controller.state().unwrap().id.clone();
    assert_eq!(checkpoints.saves(), vec![task_id]);
    assert_eq!(
        host.says_of(SayKind::Warning),
        vec!["Failed to save checkpoint: disk full".to_string()]
    );

    // The failed save did not turn the tool result into an error.
    let requests = provider.requests();
    let results = tool_results(&requests[2].messages[4]);
    assert_eq!(results[0].1, "Created a.txt");
    assert!(!results[0].2);
    controller.dispose().await;
}

#[tokio::test]
async fn test_checkpoint_restore_and_diff_failures_are_warnings() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let host = RecordingHost::new(vec![]);
    let mut deps = deps(
        test_config(store.path()),
        workspace.path(),
        ScriptedProvider::new(vec![]),
        host.clone(),
    );
    deps.checkpoints = Some(Checkpoints::new(true));
    let controller = TaskLoopController::new(deps, new_scope().await);

    assert!(!controller.restore_checkpoint("3f2a9c1").await);
    assert!(controller.checkpoint_diff("3f2a9c1").await.is_none());
    assert_eq!(
        host.says_of(SayKind::Warning),
        vec![
            "Failed to restore checkpoint: unknown revision 3f2a9c1".to_string(),
            "Failed to diff checkpoint: unknown revision 3f2a9c1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_checkpoint_restore_and_diff() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let host = RecordingHost::new(vec![]);
    let mut with_tracker = deps(
        test_config(store.path()),
        workspace.path(),
        ScriptedProvider::new(vec![]),
        host.clone(),
    );
    with_tracker.checkpoints = Some(Checkpoints::new(false));
    let controller = TaskLoopController::new(with_tracker, new_scope().await);

    assert!(controller.restore_checkpoint("3f2a9c1").await);
    let diff = controller.checkpoint_diff("3f2a9c1").await.unwrap();
    assert!(diff.starts_with("--- a/notes.txt"));
    assert!(host.says_of(SayKind::Warning).is_empty());

    let without_tracker = TaskLoopController::new(
        deps(
            test_config(store.path()),
            workspace.path(),
            ScriptedProvider::new(vec![]),
            host.clone(),
        ),
        new_scope().await,
    );
    assert!(!without_tracker.restore_checkpoint("3f2a9c1").await);
    assert!(without_tracker.checkpoint_diff("3f2a9c1").await.is_none());
    assert_eq!(host.says_of(SayKind::Warning).len(), 2);
}

#[tokio::test]
async fn test_dispose_runs_every_step_once() {
    let workspace = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Stream(vec![text(&completion("Done"))])]);
    let host = RecordingHost::new(vec![]).failing_reverts();
    let touch_tool = Arc::new(TouchTool::default());

    let mut tools = builtin_registry();
    tools.register(touch_tool.clone());
    let mut deps = deps(test_config(store.path()), workspace.path(), provider, host.clone());
    deps.tools = Arc::new(tools);
    let mut controller = TaskLoopController::new(deps, new_scope().await);

    controller.start_task("nothing to do", Vec::new()).await.unwrap();
    let task_id = controller.state().unwrap().id.clone();

    controller.dispose().await;
    assert!(controller.is_disposed());
    // Closing the tool failed, yet the edit revert still ran.
    assert_eq!(touch_tool.closes.load(Ordering::SeqCst), 1);
    assert_eq!(host.reverts(), 1);

    let history = controller.history().unwrap();
    assert!(history.is_disposed());
    assert!(matches!(history.messages(), Err(HistoryError::Disposed)));

    let metadata_path = task_dir(store.path(), &task_id).join(METADATA_FILE_NAME);
    let metadata: TaskState =
        serde_json::from_slice(&std::fs::read(metadata_path).unwrap()).unwrap();
    assert_eq!(metadata.status, TaskStatus::Completed);

    controller.dispose().await;
    assert_eq!(touch_tool.closes.load(Ordering::SeqCst), 1);
    assert_eq!(host.reverts(), 1);

    let restarted = controller.start_task("again", Vec::new()).await;
    assert!(matches!(restarted, Err(AppError::InvalidState(_))));
}
