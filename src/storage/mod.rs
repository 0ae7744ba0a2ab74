//! Storage Layer
//!
//! JSON config persistence. Conversation history has its own store under
//! `services::history`.

pub mod config;

pub use config::*;
