//! Provider-Specific Stream Adapters
//!
//! Each adapter handles the unique streaming format of its provider.

pub mod claude_api;

pub use claude_api::ClaudeApiAdapter;
