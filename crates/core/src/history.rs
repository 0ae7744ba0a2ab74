//! Persisted Conversation State
//!
//! The JSON document written to `api_conversation_history.json`:
//! `{"messages": [...], "deletedRange": [start, end]}`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::message::{Message, Role};

/// Inclusive soft-delete span over message indices.
///
/// Serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct DeletedRange {
    pub start: usize,
    pub end: usize,
}

impl DeletedRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Check the range against a message log.
    ///
    /// The first user/assistant pair is never hidden, the range starts on a
    /// user message and ends on an assistant message, and it lies inside the log.
    pub fn validate(&self, messages: &[Message]) -> CoreResult<()> {
        if self.start < 2 {
            return Err(CoreError::validation(format!(
                "deleted range {:?} would hide the first exchange",
                (self.start, self.end)
            )));
        }
        if self.end < self.start {
            return Err(CoreError::validation(format!(
                "deleted range end {} precedes start {}",
                self.end, self.start
            )));
        }
        if self.end >= messages.len() {
            return Err(CoreError::validation(format!(
                "deleted range end {} out of bounds for {} messages",
                self.end,
                messages.len()
            )));
        }
        if messages[self.start].role != Role::User || messages[self.end].role != Role::Assistant {
            return Err(CoreError::validation(format!(
                "deleted range {:?} splits a user/assistant pair",
                (self.start, self.end)
            )));
        }
        Ok(())
    }
}

impl From<(usize, usize)> for DeletedRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<DeletedRange> for (usize, usize) {
    fn from(range: DeletedRange) -> Self {
        (range.start, range.end)
    }
}

/// Full on-disk state of one task's conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistoryState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_range: Option<DeletedRange>,
}

impl ConversationHistoryState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            deleted_range: None,
        }
    }

    /// Messages that should be sent to the model (deleted range excluded).
    pub fn visible_messages(&self) -> Vec<Message> {
        match self.deleted_range {
            Some(range) => self
                .messages
                .iter()
                .enumerate()
                .filter(|(i, _)| !range.contains(*i))
                .map(|(_, m)| m.clone())
                .collect(),
            None => self.messages.clone(),
        }
    }
}
