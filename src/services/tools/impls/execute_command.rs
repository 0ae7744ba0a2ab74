//! execute_command Tool
//!
//! Runs a shell command in the working directory with a timeout. The child is
//! killed when the task is aborted.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use taskloop_core::ToolParams;
use taskloop_tools::trait_def::required_param;
use taskloop_tools::{Tool, ToolCategory, ToolContext, ToolErrorKind, ToolParameter, ToolResult};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::read_file::optional_usize;

/// Commands refused outright.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "rm -rf ~/",
    "> /dev/sda",
    "dd if=/dev/zero",
    "mkfs.",
    ":(){ :|:& };:",
    "chmod -R 777 /",
];

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT: usize = 30_000;

pub struct ExecuteCommandTool;

impl ExecuteCommandTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExecuteCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

fn read_pipe<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn truncate_output(text: &mut String) {
    if text.len() <= MAX_OUTPUT {
        return;
    }
    let mut cut = MAX_OUTPUT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n\n... (output truncated)");
}

enum Finished {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory. Returns stdout and stderr. \
         Commands time out after 120 seconds unless timeout is given. Some destructive \
         commands are blocked."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("command", "The shell command to run"),
            ToolParameter::optional("timeout", "Timeout in seconds (default 120, max 600)"),
        ]
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Execute
    }

    async fn execute(&self, ctx: &ToolContext, params: &ToolParams) -> ToolResult {
        let command = match required_param(params, "command") {
            Ok(c) => c,
            Err(result) => return result,
        };
        let timeout_secs = match optional_usize(params, "timeout") {
            Ok(v) => v
                .map(|s| s as u64)
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .clamp(1, MAX_TIMEOUT_SECS),
            Err(result) => return result,
        };

        if let Some(blocked) = BLOCKED_COMMANDS.iter().find(|b| command.contains(*b)) {
            return ToolResult::err_kind(
                ToolErrorKind::PermissionDenied,
                format!("Command blocked for safety: contains '{}'", blocked),
            );
        }

        #[cfg(windows)]
        let (shell, shell_arg) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (shell, shell_arg) = ("sh", "-c");

        let mut child = match Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ToolResult::err_kind(
                    e.kind().into(),
                    format!("Failed to spawn command: {}", e),
                )
            }
        };
        tracing::debug!(task_id = %ctx.task_id, command, "command started");

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        let finished = tokio::select! {
            status = child.wait() => Finished::Exited(status),
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => Finished::TimedOut,
            _ = ctx.scope.cancelled() => Finished::Cancelled,
        };

        let status = match finished {
            Finished::Exited(Ok(status)) => status,
            Finished::Exited(Err(e)) => {
                return ToolResult::err_kind(
                    e.kind().into(),
                    format!("Failed to execute command: {}", e),
                )
                .with_side_effect()
            }
            Finished::TimedOut => {
                let _ = child.kill().await;
                return ToolResult::err_kind(
                    ToolErrorKind::Timeout,
                    format!("Command timed out after {} seconds", timeout_secs),
                )
                .with_side_effect();
            }
            Finished::Cancelled => {
                let _ = child.kill().await;
                tracing::info!(task_id = %ctx.task_id, "command killed on abort");
                return ToolResult::err("Command cancelled").with_side_effect();
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);

        let mut text = stdout.to_string();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        truncate_output(&mut text);

        if status.success() {
            ToolResult::ok(if text.is_empty() {
                "Command completed successfully with no output".to_string()
            } else {
                text
            })
            .with_side_effect()
        } else {
            ToolResult::err_kind(
                ToolErrorKind::Unknown,
                format!(
                    "Command failed with exit code {}\n{}",
                    status.code().unwrap_or(-1),
                    text
                ),
            )
            .with_side_effect()
        }
    }
}
