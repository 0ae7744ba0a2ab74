//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.
//! Everything lives under ~/.taskloop/.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// File holding a task's conversation log.
pub const HISTORY_FILE_NAME: &str = "api_conversation_history.json";

/// File holding a task's state snapshot.
pub const METADATA_FILE_NAME: &str = "task_metadata.json";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the taskloop directory (~/.taskloop/)
pub fn taskloop_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".taskloop"))
}

/// Get the config file path (~/.taskloop/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(taskloop_dir()?.join("config.json"))
}

/// Get the default tasks directory (~/.taskloop/tasks/)
pub fn default_tasks_dir() -> AppResult<PathBuf> {
    Ok(taskloop_dir()?.join("tasks"))
}

/// Directory of one task under `tasks_dir`.
pub fn task_dir(tasks_dir: &Path, task_id: &str) -> PathBuf {
    tasks_dir.join(task_id)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the taskloop directory, creating if it doesn't exist
pub fn ensure_taskloop_dir() -> AppResult<PathBuf> {
    let path = taskloop_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
