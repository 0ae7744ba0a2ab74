//! System Prompt Builder
//!
//! Describes the working directory, the XML tool-use format, and every
//! available tool with its parameters.

use std::path::Path;

use taskloop_tools::ToolSpec;

/// Tools the loop handles itself rather than through the registry.
pub fn interactive_tool_specs() -> Vec<ToolSpec> {
    use taskloop_tools::{ToolCategory, ToolParameter};

    vec![
        ToolSpec {
            name: ATTEMPT_COMPLETION.to_string(),
            description: "Present the result of the task to the user once it is complete. \
                          The user may accept it or reply with feedback."
                .to_string(),
            parameters: vec![ToolParameter::required(
                "result",
                "The final result of the task, stated without ending in a question",
            )],
            category: ToolCategory::Interactive,
        },
        ToolSpec {
            name: ASK_FOLLOWUP_QUESTION.to_string(),
            description: "Ask the user a question when required information is missing."
                .to_string(),
            parameters: vec![ToolParameter::required("question", "The question to ask")],
            category: ToolCategory::Interactive,
        },
    ]
}

pub const ATTEMPT_COMPLETION: &str = "attempt_completion";
pub const ASK_FOLLOWUP_QUESTION: &str = "ask_followup_question";

/// Build the system prompt for the given tools.
pub fn build_system_prompt(cwd: &Path, tools: &[ToolSpec]) -> String {
    let tool_docs = tools
        .iter()
        .map(render_tool)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are a software engineering assistant working autonomously on a task in the directory shown below. You work step by step, using one tool per message, and wait for each tool's result before continuing.

## Working Directory
{cwd}

## Tool Use Format
Tool uses are written as XML-style tags. The tool name is the outer tag and each parameter is its own inner tag:

<tool_name>
<parameter_name>value</parameter_name>
</tool_name>

Use exactly one tool per message and place it at the end of the message.

## Tools

{tool_docs}

## Rules
- Relative paths are resolved against the working directory.
- When the task is done, use attempt_completion. Do not end with a question.
- If you are missing information you cannot find with tools, use ask_followup_question."#,
        cwd = cwd.display(),
        tool_docs = tool_docs,
    )
}

fn render_tool(spec: &ToolSpec) -> String {
    let params = spec
        .parameters
        .iter()
        .map(|p| {
            format!(
                "- {} ({}): {}",
                p.name,
                if p.required { "required" } else { "optional" },
                p.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let usage = spec
        .parameters
        .iter()
        .map(|p| format!("<{0}>...</{0}>", p.name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "### {name}\n{description}\nParameters:\n{params}\nUsage:\n<{name}>\n{usage}\n</{name}>",
        name = spec.name,
        description = spec.description,
        params = params,
        usage = usage,
    )
}
