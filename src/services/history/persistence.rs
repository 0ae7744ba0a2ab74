//! Debounced History Persistence
//!
//! Mutations hand a snapshot to a background tokio task which writes the
//! newest one after the debounce delay. Writes go to a temporary file that is
//! then renamed over the real one, so a crash never leaves a half-written log.
//! The conversation loop never waits on the disk; callers that need durability
//! call [`HistoryPersister::flush`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use taskloop_core::ConversationHistoryState;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{HistoryError, HistoryResult, SyncStatus};

enum PersistCommand {
    Write(ConversationHistoryState),
    Flush(oneshot::Sender<HistoryResult<()>>),
}

/// Handle to the background writer of one history file.
pub struct HistoryPersister {
    path: PathBuf,
    tx: Option<mpsc::UnboundedSender<PersistCommand>>,
    status: Arc<watch::Sender<SyncStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl HistoryPersister {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(path: PathBuf, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SyncStatus::Synced);
        let status = Arc::new(status);

        let handle = tokio::task::spawn(run_writer(path.clone(), debounce, rx, status.clone()));

        Self {
            path,
            tx: Some(tx),
            status,
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Queue a snapshot. Never blocks.
    pub fn schedule(&self, state: ConversationHistoryState) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        self.status.send_replace(SyncStatus::Pending);
        if tx.send(PersistCommand::Write(state)).is_err() {
            tracing::warn!(path = %self.path.display(), "history writer stopped; snapshot dropped");
            self.status.send_replace(SyncStatus::Failed);
        }
    }

    /// Write any pending snapshot now and wait for the result.
    pub async fn flush(&self) -> HistoryResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| HistoryError::Persistence("writer already shut down".to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(PersistCommand::Flush(reply_tx))
            .map_err(|_| HistoryError::Persistence("writer stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| HistoryError::Persistence("writer stopped".to_string()))?
    }

    /// Flush, then stop the writer task.
    pub async fn shutdown(&mut self) -> HistoryResult<()> {
        let flushed = self.flush().await;
        // Dropping the sender ends the writer loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "history writer task failed");
            }
        }
        flushed
    }
}

async fn run_writer(
    path: PathBuf,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    status: Arc<watch::Sender<SyncStatus>>,
) {
    let mut pending: Option<ConversationHistoryState> = None;
    let mut deadline = Instant::now();

    loop {
        let command = if pending.is_some() {
            tokio::select! {
                command = rx.recv() => command,
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(state) = pending.take() {
                        write_and_report(&path, &state, &status).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(PersistCommand::Write(state)) => {
                if pending.is_none() {
                    deadline = Instant::now() + debounce;
                }
                pending = Some(state);
            }
            Some(PersistCommand::Flush(reply)) => {
                let result = match pending.take() {
                    Some(state) => write_and_report(&path, &state, &status).await,
                    None => match *status.borrow() {
                        SyncStatus::Failed => Err(HistoryError::Persistence(
                            "last write failed".to_string(),
                        )),
                        _ => Ok(()),
                    },
                };
                let _ = reply.send(result);
            }
            None => {
                if let Some(state) = pending.take() {
                    let _ = write_and_report(&path, &state, &status).await;
                }
                break;
            }
        }
    }
}

async fn write_and_report(
    path: &Path,
    state: &ConversationHistoryState,
    status: &watch::Sender<SyncStatus>,
) -> HistoryResult<()> {
    match write_atomic(path, state).await {
        Ok(()) => {
            tracing::debug!(
                path = %path.display(),
                messages = state.messages.len(),
                "history persisted"
            );
            status.send_replace(SyncStatus::Synced);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist history");
            status.send_replace(SyncStatus::Failed);
            Err(e)
        }
    }
}

async fn write_atomic(path: &Path, state: &ConversationHistoryState) -> HistoryResult<()> {
    let persist_err = |e: std::io::Error| HistoryError::Persistence(e.to_string());

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
    }
    let content =
        serde_json::to_vec(state).map_err(|e| HistoryError::Persistence(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await.map_err(persist_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(persist_err)?;
    Ok(())
}

/// Read a history file; a missing file is an empty history.
pub async fn load_history(path: &Path) -> HistoryResult<ConversationHistoryState> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| HistoryError::Load(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(ConversationHistoryState::default())
        }
        Err(e) => Err(HistoryError::Load(format!("{}: {}", path.display(), e))),
    }
}
