//! # Key File Watcher
//!
//! Turns `notify` events for the key file into [`WatchEvent`]s.
//!
//! Secret mounts and editors replace the file by rename, which removes the
//! watched inode. The watch therefore has to be re-armed on the same path
//! after every `Remove`.

use crate::constants::WATCH_EVENT_CHANNEL_CAPACITY;
use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// File system signal relevant to the key file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Write,
    Remove,
    Error(String),
}

/// Source of watch events for a single path
#[async_trait]
pub trait PathWatch: Send {
    /// Next event, `None` once the watcher is gone
    async fn recv(&mut self) -> Option<WatchEvent>;

    /// Queued event, if any, without waiting
    fn try_recv(&mut self) -> Option<WatchEvent>;

    /// Watch the path again after it was replaced
    async fn rearm(&mut self) -> Result<()>;
}

/// `notify`-backed watch on the key file
pub struct FileWatcher {
    path: PathBuf,
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<WatchEvent>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Start watching `path`
    ///
    /// # Errors
    ///
    /// Fails when the platform watcher cannot be created or the path cannot
    /// be watched.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, events) = mpsc::channel(WATCH_EVENT_CHANNEL_CAPACITY);

        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => match classify(&event.kind) {
                    Some(event) => event,
                    None => return,
                },
                Err(e) => WatchEvent::Error(e.to_string()),
            };
            // A full channel already holds a pending detection
            if tx.try_send(event).is_err() {
                trace!("Watch event channel full, dropping event");
            }
        })
        .context("Failed to create file watcher")?;

        let mut this = Self {
            path,
            watcher,
            events,
        };
        this.watch()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn watch(&mut self) -> Result<()> {
        self.watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Watching gossip key file");
        Ok(())
    }
}

#[async_trait]
impl PathWatch for FileWatcher {
    async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    fn try_recv(&mut self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }

    async fn rearm(&mut self) -> Result<()> {
        if let Err(e) = self.watcher.unwatch(&self.path) {
            trace!(error = %e, "Previous watch already gone");
        }
        self.watch()
    }
}

/// Map a `notify` event kind onto the events the loop cares about
fn classify(kind: &EventKind) -> Option<WatchEvent> {
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) => Some(WatchEvent::Write),
        EventKind::Remove(_) => Some(WatchEvent::Remove),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::time::Duration;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(WatchEvent::Write)
        );
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(WatchEvent::Write)
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File)),
            Some(WatchEvent::Remove)
        );
        assert_eq!(classify(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_missing_file_cannot_be_watched() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileWatcher::new(dir.path().join("absent.key")).is_err());
    }

    #[tokio::test]
    async fn test_write_produces_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gossip.key");
        std::fs::write(&path, "a").unwrap();

        let mut watcher = FileWatcher::new(&path).unwrap();
        std::fs::write(&path, "b").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(WatchEvent::Write));
    }

    #[tokio::test]
    async fn test_rearm_after_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gossip.key");
        std::fs::write(&path, "a").unwrap();

        let mut watcher = FileWatcher::new(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(watcher.rearm().await.is_err());

        std::fs::write(&path, "b").unwrap();
        assert!(watcher.rearm().await.is_ok());
    }
}
