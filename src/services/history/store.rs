//! Conversation History Store
//!
//! Owns a task's message log and its deleted range. Every mutation updates
//! memory first and then schedules a write; a failed write is logged and
//! visible through [`ConversationHistoryStore::sync_status`] but never undoes
//! the in-memory change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use taskloop_core::{ConversationHistoryState, DeletedRange, Message};

use super::persistence::{load_history, HistoryPersister};
use super::{HistoryError, HistoryResult, HistoryView, SyncStatus};

pub struct ConversationHistoryStore {
    state: ConversationHistoryState,
    persister: Option<HistoryPersister>,
    disposed: bool,
}

impl ConversationHistoryStore {
    /// Open the history at `path`, loading it if it exists.
    pub async fn open(path: impl Into<PathBuf>, debounce: Duration) -> HistoryResult<Self> {
        let path = path.into();
        let state = load_history(&path).await?;
        if let Some(range) = state.deleted_range {
            range
                .validate(&state.messages)
                .map_err(|e| HistoryError::Load(e.to_string()))?;
        }
        tracing::debug!(
            path = %path.display(),
            messages = state.messages.len(),
            "opened conversation history"
        );
        Ok(Self {
            state,
            persister: Some(HistoryPersister::spawn(path, debounce)),
            disposed: false,
        })
    }

    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            state: ConversationHistoryState::default(),
            persister: None,
            disposed: false,
        }
    }

    fn ensure_live(&self) -> HistoryResult<()> {
        if self.disposed {
            Err(HistoryError::Disposed)
        } else {
            Ok(())
        }
    }

    fn persist(&self) {
        if let Some(persister) = &self.persister {
            persister.schedule(self.state.clone());
        }
    }

    /// Append a message; returns its index.
    pub fn add_message(&mut self, message: Message) -> HistoryResult<usize> {
        self.ensure_live()?;
        self.state.messages.push(message);
        self.persist();
        Ok(self.state.messages.len() - 1)
    }

    /// Replace the whole log. A deleted range that no longer fits is dropped.
    pub fn overwrite_history(&mut self, messages: Vec<Message>) -> HistoryResult<()> {
        self.ensure_live()?;
        if let Some(range) = self.state.deleted_range {
            if range.validate(&messages).is_err() {
                tracing::warn!(
                    start = range.start,
                    end = range.end,
                    "deleted range no longer fits rewritten history; clearing it"
                );
                self.state.deleted_range = None;
            }
        }
        self.state.messages = messages;
        self.persist();
        Ok(())
    }

    /// Store a new deleted range, or clear it with `None`.
    pub fn set_deleted_range(&mut self, range: Option<DeletedRange>) -> HistoryResult<()> {
        self.ensure_live()?;
        if let Some(range) = range {
            range
                .validate(&self.state.messages)
                .map_err(|e| HistoryError::Validation(e.to_string()))?;
        }
        self.state.deleted_range = range;
        self.persist();
        Ok(())
    }

    pub fn get_current_history(&self, view: HistoryView) -> HistoryResult<Vec<Message>> {
        self.ensure_live()?;
        Ok(match view {
            HistoryView::ForModel => self.state.visible_messages(),
            HistoryView::Full => self.state.messages.clone(),
        })
    }

    pub fn messages(&self) -> HistoryResult<&[Message]> {
        self.ensure_live()?;
        Ok(&self.state.messages)
    }

    pub fn deleted_range(&self) -> Option<DeletedRange> {
        self.state.deleted_range
    }

    pub fn len(&self) -> usize {
        self.state.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.messages.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.persister.as_ref().map(|p| p.path())
    }

    /// In-memory stores are always in sync.
    pub fn sync_status(&self) -> SyncStatus {
        self.persister
            .as_ref()
            .map_or(SyncStatus::Synced, |p| p.status())
    }

    /// Wait until the current log is on disk.
    pub async fn flush(&self) -> HistoryResult<()> {
        self.ensure_live()?;
        match &self.persister {
            Some(persister) => persister.flush().await,
            None => Ok(()),
        }
    }

    /// Flush and release the store. Later operations fail with `Disposed`.
    pub async fn dispose(&mut self) -> HistoryResult<()> {
        self.ensure_live()?;
        self.disposed = true;
        match self.persister.as_mut() {
            Some(persister) => persister.shutdown().await,
            None => Ok(()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
