//! File watcher for the on-disk resolution index.
//!
//! Watches `.deps/npm/` and turns changes to the index file into
//! [`IndexEvent`]s. Bursts of raw events (an atomic write produces several)
//! are coalesced; the final state of the file decides between
//! `IndexFileChanged` and `IndexFileDeleted`.

use super::{IndexEvent, ResolutionIndex};
use crate::paths::{self, NPM_DEPS_DIR, RESOLUTION_INDEX_PATH};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Event coalescing window.
const COALESCE_WINDOW_MS: u64 = 50;

/// Watcher error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Invalid watch root: {0}")]
    InvalidRoot(String),
    #[error("Watcher failed: {0}")]
    WatcherFailed(String),
}

/// Running watcher. Dropping it stops watching.
pub struct IndexWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    index_file: PathBuf,
}

impl IndexWatcher {
    /// Watch the index file of the workspace at `root`, sending events to `tx`.
    ///
    /// `.deps/npm/` is created if missing so that the first index write is seen.
    ///
    /// # Errors
    /// Returns an error if `root` is not a directory or the watcher cannot start.
    pub fn start(root: &Path, tx: mpsc::UnboundedSender<IndexEvent>) -> Result<Self, WatchError> {
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.display().to_string()));
        }

        let watch_dir = paths::to_host_path(root, NPM_DEPS_DIR);
        std::fs::create_dir_all(&watch_dir)
            .map_err(|e| WatchError::InvalidRoot(format!("{}: {e}", watch_dir.display())))?;
        let index_file = paths::to_host_path(root, RESOLUTION_INDEX_PATH);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<()>();
        let file_name = index_file.file_name().map(ToOwned::to_owned);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let touches_index = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if touches_index && is_relevant(&event.kind) {
                        if let Err(e) = raw_tx.send(()) {
                            warn!(error = %e, "Failed to send watch event");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Watch error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;
        info!(dir = %watch_dir.display(), "Watching resolution index");

        let task = tokio::spawn(coalesce(raw_rx, index_file.clone(), tx));

        Ok(Self {
            _watcher: watcher,
            task,
            index_file,
        })
    }

    /// Host path of the watched index file.
    #[must_use]
    pub fn index_file(&self) -> &Path {
        &self.index_file
    }
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Collapse bursts of raw events into one index event each.
async fn coalesce(
    mut raw_rx: mpsc::UnboundedReceiver<()>,
    index_file: PathBuf,
    tx: mpsc::UnboundedSender<IndexEvent>,
) {
    let mut pending = false;

    loop {
        let timeout =
            tokio::time::timeout(Duration::from_millis(COALESCE_WINDOW_MS), raw_rx.recv()).await;

        match timeout {
            Ok(Some(())) => pending = true,
            Ok(None) => {
                debug!("Index watch channel closed");
                break;
            }
            Err(_) if pending => {
                pending = false;
                let event = if tokio::fs::try_exists(&index_file).await.unwrap_or(false) {
                    IndexEvent::IndexFileChanged
                } else {
                    IndexEvent::IndexFileDeleted
                };
                debug!(?event, "Index file event");
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(_) => {}
        }
    }
}

/// Apply events to `index` until the channel closes.
pub async fn forward_events(index: Arc<ResolutionIndex>, mut rx: mpsc::UnboundedReceiver<IndexEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = index.handle_event(event).await {
            warn!(error = %e, ?event, "Failed to apply index event");
        }
    }
}
