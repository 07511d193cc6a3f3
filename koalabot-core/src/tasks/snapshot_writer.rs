// File: koalabot-core/src/tasks/snapshot_writer.rs
//
// Owns one file on disk and rewrites it wholesale with the newest snapshot.
// A single background task does the writing, so two writes to the same path
// never overlap; snapshots submitted while a write is in flight collapse into
// the latest one.

use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    generation: u64,
    content: String,
}

pub struct SnapshotWriter {
    path: PathBuf,
    generation: u64,
    latest_tx: watch::Sender<Snapshot>,
    written_rx: watch::Receiver<u64>,
    task: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    /// Spawns the writer task on the current runtime. Without a runtime,
    /// `submit` falls back to a blocking write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (latest_tx, mut latest_rx) = watch::channel(Snapshot::default());
        let (written_tx, written_rx) = watch::channel(0u64);

        let task = match Handle::try_current() {
            Ok(handle) => {
                let target = path.clone();
                Some(handle.spawn(async move {
                    while latest_rx.changed().await.is_ok() {
                        let snapshot = latest_rx.borrow_and_update().clone();
                        if let Err(e) = tokio::fs::write(&target, snapshot.content.as_bytes()).await {
                            error!("Failed to write snapshot to {:?}: {}", target, e);
                        } else {
                            trace!("Wrote snapshot #{} to {:?}", snapshot.generation, target);
                        }
                        // settle even on failure so nobody waits forever
                        let _ = written_tx.send(snapshot.generation);
                    }
                }))
            }
            Err(_) => {
                warn!("No tokio runtime; snapshots for {:?} will be written inline", path);
                None
            }
        };

        Self {
            path,
            generation: 0,
            latest_tx,
            written_rx,
            task,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues `content` as the next version of the file and returns at once.
    pub fn submit(&mut self, content: String) {
        self.generation += 1;
        if self.task.is_some() {
            self.latest_tx.send_replace(Snapshot {
                generation: self.generation,
                content,
            });
        } else if let Err(e) = std::fs::write(&self.path, content.as_bytes()) {
            error!("Failed to write snapshot to {:?}: {}", self.path, e);
        }
    }

    /// Resolves once the most recently submitted snapshot has been written
    /// (or has failed to write).
    pub async fn settled(&self) {
        if self.task.is_none() {
            return;
        }
        let target = self.generation;
        let mut rx = self.written_rx.clone();
        let _ = rx.wait_for(|written| *written >= target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_submitted_snapshot_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heck_c1.json");
        let mut writer = SnapshotWriter::new(&path);

        for i in 0..20 {
            writer.submit(format!("[{i}]"));
        }
        writer.settled().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[19]");
    }

    #[tokio::test]
    async fn settled_returns_after_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path().join("missing").join("x.json"));
        writer.submit("[]".into());
        writer.settled().await;
    }

    #[test]
    fn writes_inline_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        let mut writer = SnapshotWriter::new(&path);
        writer.submit("[1]".into());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1]");
    }
}
