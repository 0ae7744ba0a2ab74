//! Shared test utilities for tool unit tests.

use std::path::Path;

use taskloop_core::{CancellationScope, ToolParams};
use taskloop_tools::ToolContext;

/// `ToolContext` rooted at `dir` with a fresh, detached scope.
pub(crate) fn make_test_ctx(dir: &Path) -> ToolContext {
    ToolContext::new("test", dir, CancellationScope::detached())
}

pub(crate) fn params(pairs: &[(&str, &str)]) -> ToolParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
