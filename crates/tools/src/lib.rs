//! taskloop Tools
//!
//! Core types and trait definitions for tool execution:
//! - `ToolResult` - execution result type carrying a structured error kind
//! - `ToolError` / `ToolErrorKind` - the six-category error taxonomy
//! - `Tool` trait - unified tool interface
//! - `ToolRegistry` - dynamic tool registration and dispatch
//! - `assistant_message` - streamed assistant text -> text / tool-use blocks
//! - `reliability` - per-tool retry strategies, pattern history and analysis
//!
//! Tool implementations (read_file, write_to_file, execute_command, ...) live
//! in the main crate's `services::tools` module.

pub mod assistant_message;
pub mod error;
pub mod executor;
pub mod reliability;
pub mod trait_def;

// Re-export core types
pub use assistant_message::{parse_assistant_message, AssistantBlock, ParseVocabulary};
pub use error::{ToolError, ToolErrorKind};
pub use executor::ToolResult;
pub use reliability::{
    ErrorReport, ErrorSuggestion, PatternAnalysis, ReliabilityConfig, ReliabilityError,
    RetryStrategy, ToolCallPattern, ToolCallReliabilityEngine,
};
pub use trait_def::{Tool, ToolCategory, ToolContext, ToolParameter, ToolRegistry, ToolSpec};
