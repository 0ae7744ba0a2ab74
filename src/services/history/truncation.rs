//! Context Window Truncation
//!
//! The first user/assistant pair is always kept. When the previous request
//! came close to the model's context window, a contiguous block of whole
//! pairs right after it is hidden. The range only grows when a new truncation
//! is warranted, so the prompt-cache prefix stays stable between turns.

use taskloop_core::{DeletedRange, Message, Role, UsageIncrement};

/// How much of the remaining conversation to hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationKeep {
    /// Hide roughly half of the messages after the current range
    Half,
    /// Hide roughly three quarters of them
    Quarter,
}

impl TruncationKeep {
    /// Truncation needed for a request that used `total_tokens`, if any.
    ///
    /// The ceiling is inclusive. When usage overshot it by more than twice,
    /// a larger block is dropped.
    pub fn for_usage(total_tokens: u64, max_allowed: u64) -> Option<Self> {
        if total_tokens < max_allowed {
            None
        } else if total_tokens / 2 > max_allowed {
            Some(Self::Quarter)
        } else {
            Some(Self::Half)
        }
    }
}

/// Extend the deleted range over whole pairs after the first exchange.
///
/// Returns `None` when the log is too short to hide anything new.
pub fn next_truncation_range(
    messages: &[Message],
    current: Option<DeletedRange>,
    keep: TruncationKeep,
) -> Option<DeletedRange> {
    const RANGE_START: usize = 2;

    let start_of_rest = current.map_or(RANGE_START, |r| r.end + 1);
    let remaining = messages.len().saturating_sub(start_of_rest);
    let to_remove = match keep {
        TruncationKeep::Half => remaining / 4 * 2,
        TruncationKeep::Quarter => remaining * 3 / 4 / 2 * 2,
    };
    if to_remove == 0 {
        return None;
    }

    let mut end = start_of_rest + to_remove - 1;
    // The range must close on an assistant message so no pair is split.
    while end > start_of_rest && messages[end].role != Role::Assistant {
        end -= 1;
    }

    let range = DeletedRange::new(RANGE_START, end);
    if current.is_some_and(|c| c.end >= end) {
        return None;
    }
    range.validate(messages).ok()?;
    Some(range)
}

/// New range to store given the previous request's usage, or `None` to keep
/// the current one.
pub fn plan_truncation(
    messages: &[Message],
    current: Option<DeletedRange>,
    previous_usage: &UsageIncrement,
    max_allowed_tokens: u64,
) -> Option<DeletedRange> {
    let keep = TruncationKeep::for_usage(previous_usage.total_tokens(), max_allowed_tokens)?;
    let range = next_truncation_range(messages, current, keep)?;
    tracing::info!(
        tokens = previous_usage.total_tokens(),
        max_allowed_tokens,
        ?keep,
        start = range.start,
        end = range.end,
        "truncating conversation history"
    );
    Some(range)
}
