//! list_files Tool
//!
//! Lists a directory's entries with type and size, or, with `recursive`, a
//! gitignore-aware walk of the whole tree.

use async_trait::async_trait;
use taskloop_core::ToolParams;
use taskloop_tools::trait_def::required_param;
use taskloop_tools::{Tool, ToolCategory, ToolContext, ToolErrorKind, ToolParameter, ToolResult};

use crate::services::task::environment::list_files;

/// Maximum number of entries in one listing.
const MAX_ENTRIES: usize = 200;

fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

pub struct ListFilesTool;

impl ListFilesTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ListFilesTool {
    fn default() -> Self {
        Self::new()
    }
}

fn list_flat(path: &std::path::Path) -> std::io::Result<(Vec<String>, usize)> {
    let mut items: Vec<(String, bool, u64)> = Vec::new();
    for entry in std::fs::read_dir(path)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        let size = if is_dir {
            0
        } else {
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        };
        items.push((name, is_dir, size));
    }

    // Directories first, then case-insensitive by name.
    items.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
    });

    let total = items.len();
    let lines = items
        .into_iter()
        .take(MAX_ENTRIES)
        .map(|(name, is_dir, size)| {
            if is_dir {
                format!("DIR   {:>10}  {}/", "-", name)
            } else {
                format!("FILE  {:>10}  {}", format_size(size), name)
            }
        })
        .collect();
    Ok((lines, total))
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories at the given path. Set recursive to true to list the \
         whole tree (respects .gitignore, skips hidden files)."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("path", "Directory to list, relative to the working directory"),
            ToolParameter::optional("recursive", "true to list recursively (default false)"),
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
        let recursive = params
            .get("recursive")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        let path = ctx.resolve(path_param);
        if !path.exists() {
            return ToolResult::err_kind(
                ToolErrorKind::ResourceNotFound,
                format!("Directory not found: {}", path_param),
            );
        }
        if !path.is_dir() {
            return ToolResult::err_kind(
                ToolErrorKind::InvalidParameter,
                format!("Not a directory: {}", path_param),
            );
        }

        if recursive {
            let walk_root = path.clone();
            let listed =
                tokio::task::spawn_blocking(move || list_files(&walk_root, MAX_ENTRIES)).await;
            let (entries, truncated) = match listed {
                Ok(listed) => listed,
                Err(e) => {
                    return ToolResult::err_kind(
                        ToolErrorKind::Unknown,
                        format!("Failed to list {}: {}", path_param, e),
                    )
                }
            };
            if entries.is_empty() {
                return ToolResult::ok(format!("No files found in {}", path_param));
            }
            let mut out = entries.join("\n");
            if truncated {
                out.push_str(&format!(
                    "\n\n(Listing truncated to {} entries. List a subdirectory to see more.)",
                    MAX_ENTRIES
                ));
            }
            return ToolResult::ok(out);
        }

        match list_flat(&path) {
            Ok((lines, _)) if lines.is_empty() => {
                ToolResult::ok(format!("Directory is empty: {}", path_param))
            }
            Ok((lines, total)) => {
                let mut out = lines.join("\n");
                if total > MAX_ENTRIES {
                    out.push_str(&format!(
                        "\n\n(Showing {} of {} entries.)",
                        MAX_ENTRIES, total
                    ));
                }
                ToolResult::ok(out)
            }
            Err(e) => ToolResult::err_kind(
                e.kind().into(),
                format!("Failed to list {}: {}", path_param, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{make_test_ctx, params};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(10), "10 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_flat_listing_dirs_first() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        std::fs::write(dir.path().join(".secret"), "").unwrap();
        let ctx = make_test_ctx(dir.path());

        let result = ListFilesTool::new()
            .execute(&ctx, &params(&[("path", ".")]))
            .await;
        let output = result.output.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("DIR") && lines[0].ends_with("zdir/"));
        assert!(lines[1].contains("5 B") && lines[1].ends_with("b.txt"));
    }

    #[tokio::test]
    async fn test_recursive_listing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/nested/lib.rs"), "").unwrap();
        let ctx = make_test_ctx(dir.path());

        let result = ListFilesTool::new()
            .execute(&ctx, &params(&[("path", "."), ("recursive", "true")]))
            .await;
        let output = result.output.unwrap();
        assert!(output.contains("src/nested/lib.rs"));
    }

    #[tokio::test]
    async fn test_missing_and_non_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "").unwrap();
        let ctx = make_test_ctx(dir.path());
        let tool = ListFilesTool::new();

        let result = tool.execute(&ctx, &params(&[("path", "missing")])).await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::ResourceNotFound));

        let result = tool.execute(&ctx, &params(&[("path", "f.txt")])).await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidParameter));
    }
}
