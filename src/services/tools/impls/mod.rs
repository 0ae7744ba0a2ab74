//! Individual Tool Implementations
//!
//! Each tool is a separate struct implementing the `Tool` trait, registered
//! by name in a `ToolRegistry`.

pub mod execute_command;
pub mod list_files;
pub mod read_file;
pub mod search_files;
pub mod write_to_file;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use execute_command::ExecuteCommandTool;
pub use list_files::ListFilesTool;
pub use read_file::ReadFileTool;
pub use search_files::SearchFilesTool;
pub use write_to_file::WriteToFileTool;
