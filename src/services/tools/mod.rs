//! Tools
//!
//! Concrete implementations of the workspace tools the model can call:
//! - read_file: file reading with line windows
//! - write_to_file: file creation/overwrite
//! - list_files: directory listing, flat or recursive
//! - search_files: regex search over file contents
//! - execute_command: shell command execution with timeout
//!
//! `attempt_completion` and `ask_followup_question` are handled by the task
//! loop itself and are not registered here.

pub mod impls;

use std::sync::Arc;

use taskloop_tools::ToolRegistry;

pub use impls::{ExecuteCommandTool, ListFilesTool, ReadFileTool, SearchFilesTool, WriteToFileTool};

/// Registry holding every bundled tool.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new()));
    registry.register(Arc::new(WriteToFileTool::new()));
    registry.register(Arc::new(ListFilesTool::new()));
    registry.register(Arc::new(SearchFilesTool::new()));
    registry.register(Arc::new(ExecuteCommandTool::new()));
    registry
}
