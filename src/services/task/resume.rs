//! Resume Reconstruction
//!
//! A saved history can end anywhere: after an assistant message whose tool
//! calls never got results, or on a user turn the model never answered. This
//! module turns it into a history plus the next user turn such that every
//! tool use has exactly one result.

use chrono::{DateTime, Utc};
use taskloop_core::{ContentBlock, Message, Role};

use super::prompts::{task_resumption, INTERRUPTED_TOOL_RESULT};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    /// History to overwrite the store with
    pub history: Vec<Message>,
    /// Content of the first user turn after resuming
    pub next_user_content: Vec<ContentBlock>,
}

/// Results for every tool use in `assistant` that `answered` does not cover.
fn interrupted_results(assistant: &Message, answered: &[ContentBlock]) -> Vec<ContentBlock> {
    let answered_ids: std::collections::HashSet<&str> = answered
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    assistant
        .tool_uses()
        .into_iter()
        .filter(|(id, _, _)| !answered_ids.contains(id))
        .map(|(id, _, _)| ContentBlock::tool_result(id, INTERRUPTED_TOOL_RESULT))
        .collect()
}

pub fn reconstruct(
    mut history: Vec<Message>,
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    cwd: &str,
    feedback: Option<&str>,
) -> AppResult<ResumePlan> {
    let Some(last) = history.last() else {
        return Err(AppError::invalid_state("cannot resume a task with no history"));
    };

    let mut content = match last.role {
        Role::Assistant => interrupted_results(last, &[]),
        Role::User => {
            let Some(dangling) = history.pop() else {
                return Err(AppError::internal("history emptied while resuming"));
            };
            let mut content = dangling.content;
            // Environment details from the abandoned turn are regenerated.
            content.retain(|b| {
                !b.as_text()
                    .is_some_and(|t| t.starts_with("<environment_details>"))
            });
            if let Some(previous) = history.last().filter(|m| m.is_assistant()) {
                let missing = interrupted_results(previous, &content);
                content.extend(missing);
            }
            content
        }
    };

    tracing::info!(
        messages = history.len(),
        synthesized = content
            .iter()
            .filter(|b| {
                matches!(
                    b,
                    ContentBlock::ToolResult { content, .. } if content == INTERRUPTED_TOOL_RESULT
                )
            })
            .count(),
        "reconstructed history for resume"
    );

    content.push(ContentBlock::text(task_resumption(
        last_activity,
        now,
        cwd,
        feedback,
    )));

    Ok(ResumePlan {
        history,
        next_user_content: content,
    })
}
