//! write_to_file Tool
//!
//! Writes complete file contents, creating parent directories as needed.

use async_trait::async_trait;
use taskloop_core::ToolParams;
use taskloop_tools::trait_def::required_param;
use taskloop_tools::{Tool, ToolCategory, ToolContext, ToolErrorKind, ToolParameter, ToolResult};

pub struct WriteToFileTool;

impl WriteToFileTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WriteToFileTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Models often wrap content in a leading and trailing newline.
fn normalize_content(content: &str) -> String {
    let content = content.strip_prefix('\n').unwrap_or(content);
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[async_trait]
impl Tool for WriteToFileTool {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Overwrites the file if it exists and creates it (and any \
         missing directories) if it does not. Always provide the complete file content."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("path", "Path of the file, relative to the working directory"),
            ToolParameter::required("content", "The complete content to write"),
        ]
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    async fn execute(&self, ctx: &ToolContext, params: &ToolParams) -> ToolResult {
        let path_param = match required_param(params, "path") {
            Ok(p) => p,
            Err(result) => return result,
        };
        // Empty content is a legitimate write, so only absence is an error.
        let Some(content) = params.get("content") else {
            return ToolResult::err_kind(
                ToolErrorKind::MissingParameter,
                "Missing required parameter: content",
            );
        };

        let path = ctx.resolve(path_param);
        if path.is_dir() {
            return ToolResult::err_kind(
                ToolErrorKind::InvalidParameter,
                format!("Path is a directory: {}", path_param),
            );
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err_kind(
                    e.kind().into(),
                    format!("Failed to create directories for {}: {}", path_param, e),
                );
            }
        }

        let existed = path.exists();
        let content = normalize_content(content);
        match tokio::fs::write(&path, &content).await {
            Ok(()) => {
                tracing::debug!(task_id = %ctx.task_id, path = %path.display(), "file written");
                ToolResult::ok(format!(
                    "Successfully {} {} ({} lines)",
                    if existed { "updated" } else { "created" },
                    path_param,
                    content.lines().count()
                ))
                .with_side_effect()
            }
            Err(e) => ToolResult::err_kind(
                e.kind().into(),
                format!("Failed to write {}: {}", path_param, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{make_test_ctx, params};
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let ctx = make_test_ctx(dir.path());

        let result = WriteToFileTool::new()
            .execute(&ctx, &params(&[("path", "a/b/c.txt"), ("content", "\nhello\nworld")]))
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.side_effect);
        assert!(result.output.unwrap().contains("created a/b/c.txt (2 lines)"));
        let written = std::fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap();
        assert_eq!(written, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old").unwrap();
        let ctx = make_test_ctx(dir.path());

        let result = WriteToFileTool::new()
            .execute(&ctx, &params(&[("path", "f.txt"), ("content", "new\n")]))
            .await;
        assert!(result.output.unwrap().contains("updated"));
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new\n");
    }

    #[tokio::test]
    async fn test_write_missing_content() {
        let dir = TempDir::new().unwrap();
        let ctx = make_test_ctx(dir.path());
        let result = WriteToFileTool::new()
            .execute(&ctx, &params(&[("path", "f.txt")]))
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::MissingParameter));
        assert!(!dir.path().join("f.txt").exists());
    }
}
