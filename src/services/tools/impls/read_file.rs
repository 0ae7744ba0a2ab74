//! read_file Tool
//!
//! Reads a text file with line numbers. `offset` and `limit` select a window
//! of a large file.

use async_trait::async_trait;
use taskloop_core::ToolParams;
use taskloop_tools::trait_def::required_param;
use taskloop_tools::{Tool, ToolCategory, ToolContext, ToolErrorKind, ToolParameter, ToolResult};

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an optional positive integer parameter.
pub(crate) fn optional_usize(params: &ToolParams, name: &str) -> Result<Option<usize>, ToolResult> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            ToolResult::err_kind(
                ToolErrorKind::InvalidParameter,
                format!("Invalid {}: '{}' is not a non-negative integer", name, raw),
            )
        }),
    }
}

fn render_lines(content: &str, offset: usize, limit: usize) -> String {
    let mut out = String::new();
    for (i, line) in content.lines().enumerate().skip(offset - 1).take(limit) {
        let line = if line.chars().count() > MAX_LINE_CHARS {
            let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
            format!("{}... (line truncated)", cut)
        } else {
            line.to_string()
        };
        out.push_str(&format!("{:6}\t{}\n", i + 1, line));
    }
    out
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Returns the contents with line numbers. \
         Use offset and limit to read part of a large file."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("path", "Path of the file, relative to the working directory"),
            ToolParameter::optional("offset", "Line number to start reading from (1-indexed)"),
            ToolParameter::optional("limit", "Maximum number of lines to read (default 2000)"),
        ]
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    async fn execute(&self, ctx: &ToolContext, params: &ToolParams) -> ToolResult {
        let path_param = match required_param(params, "path") {
            Ok(p) => p,
            Err(result) => return result,
        };
        let offset = match optional_usize(params, "offset") {
            Ok(v) => v.unwrap_or(1).max(1),
            Err(result) => return result,
        };
        let limit = match optional_usize(params, "limit") {
            Ok(v) => v.unwrap_or(DEFAULT_LIMIT),
            Err(result) => return result,
        };

        let path = ctx.resolve(path_param);
        if path.is_dir() {
            return ToolResult::err_kind(
                ToolErrorKind::InvalidParameter,
                format!("Path is a directory, not a file: {}", path_param),
            );
        }

        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    return ToolResult::ok(format!(
                        "[binary file skipped] {} ({} bytes).",
                        path_param,
                        e.as_bytes().len()
                    ))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::err_kind(
                    ToolErrorKind::ResourceNotFound,
                    format!("File not found: {}", path_param),
                )
            }
            Err(e) => {
                return ToolResult::err_kind(
                    e.kind().into(),
                    format!("Failed to read {}: {}", path_param, e),
                )
            }
        };

        let total_lines = content.lines().count();
        if total_lines == 0 {
            return ToolResult::ok(format!("(empty file: {})", path_param));
        }
        if offset > total_lines {
            return ToolResult::err_kind(
                ToolErrorKind::InvalidParameter,
                format!(
                    "Invalid offset: {} is past the end of the file ({} lines)",
                    offset, total_lines
                ),
            );
        }

        let mut out = render_lines(&content, offset, limit);
        let last_shown = (offset - 1 + limit).min(total_lines);
        if last_shown < total_lines {
            out.push_str(&format!(
                "\n(Showing lines {}-{} of {}. Use offset to read more.)",
                offset, last_shown, total_lines
            ));
        }
        ToolResult::ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{make_test_ctx, params};
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_with_line_numbers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let ctx = make_test_ctx(dir.path());

        let result = ReadFileTool::new()
            .execute(&ctx, &params(&[("path", "a.txt")]))
            .await;
        assert!(result.success);
        let output = result.output.unwrap();
        assert!(output.contains("     1\tone"));
        assert!(output.contains("     3\tthree"));
    }

    #[tokio::test]
    async fn test_read_window() {
        let dir = TempDir::new().unwrap();
        let text: String = (1..=10).map(|i| format!("line{}\n", i)).collect();
        std::fs::write(dir.path().join("big.txt"), text).unwrap();
        let ctx = make_test_ctx(dir.path());

        let result = ReadFileTool::new()
            .execute(&ctx, &params(&[("path", "big.txt"), ("offset", "3"), ("limit", "2")]))
            .await;
        let output = result.output.unwrap();
        assert!(output.contains("     3\tline3"));
        assert!(output.contains("     4\tline4"));
        assert!(!output.contains("line5"));
        assert!(output.contains("Showing lines 3-4 of 10"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let ctx = make_test_ctx(dir.path());
        let result = ReadFileTool::new()
            .execute(&ctx, &params(&[("path", "nope.txt")]))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::ResourceNotFound));
    }

    #[tokio::test]
    async fn test_read_bad_offset_and_missing_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let ctx = make_test_ctx(dir.path());
        let tool = ReadFileTool::new();

        let result = tool
            .execute(&ctx, &params(&[("path", "a.txt"), ("offset", "abc")]))
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidParameter));

        let result = tool.execute(&ctx, &ToolParams::new()).await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::MissingParameter));
    }
}
