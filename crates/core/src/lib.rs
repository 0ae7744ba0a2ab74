//! taskloop Core
//!
//! Foundational data model, error types, stream increment types and
//! cancellation primitives for the taskloop workspace. This crate has zero
//! dependencies on provider, tool, or persistence code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `message` - Role-tagged messages and their content blocks
//! - `history` - Persisted conversation state with the soft-delete range
//! - `streaming` - Typed stream increments and the provider adapter trait
//! - `cancellation` - Cancellation scope (abort token + session epoch)
//!
//! ## Design Principles
//!
//! 1. **Small dependency surface** - serde/thiserror/chrono/tokio-util only
//! 2. **Plain data** - everything here is serializable or trivially cloneable
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod cancellation;
pub mod error;
pub mod history;
pub mod message;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Conversation Data Model ────────────────────────────────────────────
pub use history::{ConversationHistoryState, DeletedRange};
pub use message::{ContentBlock, ImageSource, Message, Role, ToolParams};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, StreamIncrement, UsageIncrement};

// ── Cancellation ───────────────────────────────────────────────────────
pub use cancellation::{CancellationScope, SessionEpoch};
