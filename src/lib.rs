//! taskloop - Agentic Task Execution Engine
//!
//! Runs a coding task as a loop between a language model and a set of
//! workspace tools. It includes:
//! - The task loop controller with cooperative abort and resume
//! - Conversation history persistence with context-window truncation
//! - Concrete file, search and shell tools
//! - Configuration, logging and error types

pub mod logging;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::settings::{AppConfig, SettingsUpdate};
pub use storage::ConfigService;
pub use utils::error::{AppError, AppResult};
