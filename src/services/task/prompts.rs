//! Fixed texts the loop feeds back to the model.

use chrono::{DateTime, Utc};

pub const INTERRUPTED_TOOL_RESULT: &str =
    "Task was interrupted before this tool call could be completed.";

pub const RESPONSE_INTERRUPTED_BY_USER: &str = "[Response interrupted by user]";

pub const RESPONSE_INTERRUPTED_BY_API_ERROR: &str = "[Response interrupted by API Error]";

pub const RESPONSE_INTERRUPTED_BY_FEEDBACK: &str = "[Response interrupted by user feedback]";

pub const RESPONSE_INTERRUPTED_BY_TOOL_USE: &str = "[Response interrupted by a tool use result. Only one tool may be used at a time and should be placed at the end of the message.]";

pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "Failure: I did not provide a response.";

pub fn no_tools_used() -> String {
    "[ERROR] You did not use a tool in your previous response! Please retry with a tool use.\n\n\
     # Reminder: Instructions for Tool Use\n\n\
     Tool uses are formatted using XML-style tags. The tool name is enclosed in opening and closing tags, \
     and each parameter is similarly enclosed within its own set of tags:\n\n\
     <tool_name>\n<parameter1_name>value1</parameter1_name>\n</tool_name>\n\n\
     # Next Steps\n\n\
     If you have completed the user's task, use the attempt_completion tool. \
     If you require additional information from the user, use the ask_followup_question tool. \
     Otherwise, if you have not completed the task and do not need additional information, then proceed with the next step of the task."
        .to_string()
}

pub fn tool_denied() -> String {
    "The user denied this operation.".to_string()
}

pub fn tool_denied_with_feedback(feedback: &str) -> String {
    format!(
        "The user denied this operation and provided the following feedback:\n<feedback>\n{}\n</feedback>",
        feedback
    )
}

pub fn tool_approved_with_feedback(feedback: &str) -> String {
    format!(
        "The user approved this operation and provided the following context:\n<feedback>\n{}\n</feedback>",
        feedback
    )
}

pub fn tool_not_executed(name: &str) -> String {
    format!(
        "Tool [{}] was not executed because a tool has already been used in this message. \
         Only one tool may be used per message. You must assess the first tool's result before proceeding to use the next tool.",
        name
    )
}

pub fn tool_skipped_after_rejection(name: &str) -> String {
    format!(
        "Skipping tool [{}] due to user rejecting a previous tool.",
        name
    )
}

pub fn completion_feedback(feedback: &str) -> String {
    format!(
        "The user has provided feedback on the results. Consider their input to continue the task, \
         and then attempt completion again.\n<feedback>\n{}\n</feedback>",
        feedback
    )
}

pub fn followup_answer(answer: &str) -> String {
    format!("<answer>\n{}\n</answer>", answer)
}

pub fn too_many_mistakes(feedback: Option<&str>) -> String {
    let mut text = "You seem to be having trouble proceeding.".to_string();
    if let Some(feedback) = feedback {
        text.push_str(&format!(
            " The user has provided the following feedback to help guide you:\n<feedback>\n{}\n</feedback>",
            feedback
        ));
    }
    text
}

pub fn task_message(task: &str) -> String {
    format!("<task>\n{}\n</task>", task)
}

/// Notice appended to the first turn after a resume.
pub fn task_resumption(
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    cwd: &str,
    feedback: Option<&str>,
) -> String {
    let mut text = format!(
        "[TASK RESUMPTION] This task was interrupted {}. It may or may not be complete, so please reassess the task context. \
         Be aware that the project state may have changed since then. The current working directory is now '{}'. \
         If the task has not been completed, retry the last step before interruption and proceed with completing the task.\n\n\
         Note: If you previously attempted a tool use that the user did not provide a result for, \
         you should assume the tool use was not successful and assess whether you should retry.",
        ago_text(last_activity, now),
        cwd
    );
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        text.push_str(&format!(
            "\n\nNew instructions for task continuation:\n<user_message>\n{}\n</user_message>",
            feedback
        ));
    }
    text
}

fn ago_text(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };
    if elapsed.num_days() > 0 {
        plural(elapsed.num_days(), "day")
    } else if elapsed.num_hours() > 0 {
        plural(elapsed.num_hours(), "hour")
    } else if elapsed.num_minutes() > 0 {
        plural(elapsed.num_minutes(), "minute")
    } else {
        "just now".to_string()
    }
}
