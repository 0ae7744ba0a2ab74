//! Environment Details
//!
//! Appended to every user turn so the model knows where it is and when.
//! The first turn of a run also gets a bounded, gitignore-aware listing of
//! the working directory.

use std::path::Path;

use chrono::Local;

/// Maximum number of entries in the initial file listing.
const FILE_LISTING_LIMIT: usize = 200;

pub fn environment_details(cwd: &Path, include_file_listing: bool) -> String {
    let mut details = String::from("<environment_details>\n");
    details.push_str(&format!("# Current Working Directory\n{}\n", cwd.display()));
    details.push_str(&format!(
        "\n# Current Time\n{}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S %:z")
    ));

    if include_file_listing {
        details.push_str(&format!("\n# Current Working Directory ({}) Files\n", cwd.display()));
        let (entries, truncated) = list_files(cwd, FILE_LISTING_LIMIT);
        if entries.is_empty() {
            details.push_str("No files found.\n");
        } else {
            for entry in &entries {
                details.push_str(entry);
                details.push('\n');
            }
            if truncated {
                details.push_str(&format!(
                    "\n(File list truncated to {} entries. Use list_files on specific directories to explore further.)\n",
                    FILE_LISTING_LIMIT
                ));
            }
        }
    }

    details.push_str("</environment_details>");
    details
}

/// Relative paths under `root`, directories suffixed with `/`.
pub fn list_files(root: &Path, limit: usize) -> (Vec<String>, bool) {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for entry in walker.flatten() {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        if entries.len() >= limit {
            return (entries, true);
        }
        let mut display = relative.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            display.push('/');
        }
        entries.push(display);
    }
    (entries, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_with_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();

        let details = environment_details(dir.path(), true);
        assert!(details.starts_with("<environment_details>"));
        assert!(details.ends_with("</environment_details>"));
        assert!(details.contains("src/\n"));
        assert!(details.contains("src/main.rs"));
        assert!(!details.contains(".hidden"));
    }

    #[test]
    fn test_details_without_listing() {
        let dir = tempfile::tempdir().unwrap();
        let details = environment_details(dir.path(), false);
        assert!(details.contains("# Current Time"));
        assert!(!details.contains("Files"));
    }

    #[test]
    fn test_listing_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{}.txt", i)), "").unwrap();
        }
        let (entries, truncated) = list_files(dir.path(), 3);
        assert_eq!(entries.len(), 3);
        assert!(truncated);
    }
}
