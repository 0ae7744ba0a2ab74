//! search_files Tool
//!
//! Regex search over file contents with .gitignore-aware traversal. Each match
//! is shown with one line of context on either side.

use std::path::Path;

use async_trait::async_trait;
use taskloop_core::ToolParams;
use taskloop_tools::trait_def::required_param;
use taskloop_tools::{Tool, ToolCategory, ToolContext, ToolErrorKind, ToolParameter, ToolResult};

const CONTEXT_LINES: usize = 1;
const MAX_RESULTS: usize = 300;
const MAX_OUTPUT: usize = 30_000;

pub struct SearchFilesTool;

impl SearchFilesTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SearchFilesTool {
    fn default() -> Self {
        Self::new()
    }
}

struct SearchOutput {
    results: Vec<String>,
    output_len: usize,
}

impl SearchOutput {
    fn is_full(&self) -> bool {
        self.results.len() >= MAX_RESULTS || self.output_len >= MAX_OUTPUT
    }
}

fn search_file(root: &Path, path: &Path, regex: &regex::Regex, out: &mut SearchOutput) {
    // Binary or unreadable files are skipped.
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let display = path
        .strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    let lines: Vec<&str> = content.lines().collect();
    for (line_num, line) in lines.iter().enumerate() {
        if !regex.is_match(line) {
            continue;
        }
        let start = line_num.saturating_sub(CONTEXT_LINES);
        let end = (line_num + CONTEXT_LINES + 1).min(lines.len());
        let context: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let marker = if start + i == line_num { ">" } else { " " };
                format!("{}{}:{}", marker, start + i + 1, l)
            })
            .collect();

        let entry = format!("{}:\n{}", display, context.join("\n"));
        out.output_len += entry.len() + 1;
        out.results.push(entry);
        if out.is_full() {
            return;
        }
    }
}

fn run_search(
    search_path: &Path,
    regex: &regex::Regex,
    file_pattern: Option<&str>,
) -> Result<SearchOutput, ToolResult> {
    let mut out = SearchOutput {
        results: Vec::new(),
        output_len: 0,
    };

    if search_path.is_file() {
        let root = search_path.parent().unwrap_or(search_path);
        search_file(root, search_path, regex, &mut out);
        return Ok(out);
    }

    let overrides = match file_pattern {
        Some(pattern) => {
            let mut builder = ignore::overrides::OverrideBuilder::new(search_path);
            if let Err(e) = builder.add(pattern) {
                return Err(ToolResult::err_kind(
                    ToolErrorKind::InvalidParameter,
                    format!("Invalid file_pattern '{}': {}", pattern, e),
                ));
            }
            match builder.build() {
                Ok(o) => Some(o),
                Err(e) => {
                    return Err(ToolResult::err_kind(
                        ToolErrorKind::InvalidParameter,
                        format!("Invalid file_pattern '{}': {}", pattern, e),
                    ))
                }
            }
        }
        None => None,
    };

    let walker = ignore::WalkBuilder::new(search_path)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if let Some(ref overrides) = overrides {
            if !overrides.matched(path, false).is_whitelist() {
                continue;
            }
        }
        search_file(search_path, path, regex, &mut out);
        if out.is_full() {
            break;
        }
    }
    Ok(out)
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search files under a directory for a regular expression. Respects .gitignore and \
         skips hidden files. Returns each match with its file path, line number and context."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "path",
                "Directory (or file) to search, relative to the working directory",
            ),
            ToolParameter::required("regex", "Rust regular expression to search for"),
            ToolParameter::optional(
                "file_pattern",
                "Glob restricting which files are searched, e.g. *.rs",
            ),
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
        let pattern = match required_param(params, "regex") {
            Ok(p) => p,
            Err(result) => return result,
        };
        let file_pattern = params
            .get("file_pattern")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let regex = match regex::Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => {
                return ToolResult::err_kind(
                    ToolErrorKind::InvalidParameter,
                    format!("Invalid regex pattern: {}", e),
                )
            }
        };

        let search_path = ctx.resolve(path_param);
        if !search_path.exists() {
            return ToolResult::err_kind(
                ToolErrorKind::ResourceNotFound,
                format!("Path not found: {}", path_param),
            );
        }

        let searched = tokio::task::spawn_blocking(move || {
            run_search(&search_path, &regex, file_pattern.as_deref())
        })
        .await;
        let out = match searched {
            Ok(Ok(out)) => out,
            Ok(Err(result)) => return result,
            Err(e) => {
                return ToolResult::err_kind(ToolErrorKind::Unknown, format!("Search failed: {}", e))
            }
        };

        if out.results.is_empty() {
            return ToolResult::ok("No matches found");
        }
        let mut output = out.results.join("\n");
        if out.is_full() {
            output.push_str("\n\n... (results truncated)");
        }
        ToolResult::ok(output)
    }
}
