//! Watching for shards written by other origins
//!
//! Another process sharing the space directory (a sync client, a second device
//! writing through a shared folder) appends to its own shards. The watcher notices
//! those files changing, replays them through the parser and hands the operations
//! to the caller. Whole shards are re-read on every change; the reducer consuming
//! them ignores operations it has already applied.

use super::fs::FileSystemPersistence;
use crate::error::StorageError;
use crate::op::Operation;
use crate::space::ShardPath;
use crate::types::{OriginId, TreeId};
use chrono::NaiveDate;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Operations read from a shard that some other origin wrote
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingOps {
    pub tree_id: TreeId,
    pub origin_id: OriginId,
    pub date: NaiveDate,
    pub ops: Vec<Operation>,
}

pub struct ShardWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ShardWatcher {
    /// Watch the space's `ops` directory. Shards whose origin is in `local_origins`
    /// are ignored. Must be called inside a Tokio runtime.
    pub fn start(
        store: Arc<FileSystemPersistence>,
        local_origins: HashSet<OriginId>,
        sink: mpsc::UnboundedSender<IncomingOps>,
    ) -> Result<Self, StorageError> {
        let ops_dir = store.layout().ops_dir();
        std::fs::create_dir_all(&ops_dir)?;

        let (path_tx, path_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    if ShardPath::parse(&path).is_some() && path_tx.send(path).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!("Shard watch error: {}", e),
        })
        .map_err(|e| StorageError::IoError(std::io::Error::other(format!("Failed to create watcher: {e}"))))?;

        watcher
            .watch(&ops_dir, RecursiveMode::Recursive)
            .map_err(|e| StorageError::IoError(std::io::Error::other(format!("Failed to watch {}: {e}", ops_dir.display()))))?;
        info!(ops_dir = %ops_dir.display(), "Watching operation shards");

        let task = tokio::spawn(forward_changes(store, local_origins, path_rx, sink));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

/// Dropping the watcher stops both the file watch and the forwarding task.
impl Drop for ShardWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward_changes(
    store: Arc<FileSystemPersistence>,
    local_origins: HashSet<OriginId>,
    mut paths: mpsc::UnboundedReceiver<PathBuf>,
    sink: mpsc::UnboundedSender<IncomingOps>,
) {
    while let Some(first) = paths.recv().await {
        // Collapse bursts of events for the same files into one read each.
        let mut batch = BTreeSet::from([first]);
        while let Ok(path) = paths.try_recv() {
            batch.insert(path);
        }

        for path in batch {
            let Some(shard) = ShardPath::parse(&path) else {
                continue;
            };
            if local_origins.contains(&shard.origin_id) {
                continue;
            }

            let ops = match store.read_shard(&path, &shard.origin_id).await {
                Ok(ops) => ops,
                Err(e) => {
                    error!(shard = %path.display(), error = %e, "Failed to read changed shard");
                    continue;
                }
            };
            if ops.is_empty() {
                continue;
            }

            debug!(
                tree_id = %shard.tree_id,
                origin_id = %shard.origin_id,
                count = ops.len(),
                "Incoming operations from shard"
            );
            let incoming = IncomingOps {
                tree_id: shard.tree_id,
                origin_id: shard.origin_id,
                date: shard.date,
                ops,
            };
            if sink.send(incoming).is_err() {
                debug!("Incoming ops receiver dropped, stopping shard watcher");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{encode_lines, OpsParser};
    use crate::space::SpaceLayout;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_foreign_shard_is_delivered_and_local_is_ignored() {
        let temp = TempDir::new().unwrap();
        let layout = SpaceLayout::new(temp.path());
        layout.init("s1", None).unwrap();
        let parser = Arc::new(OpsParser::spawn(Duration::from_secs(5)).unwrap());
        let store = Arc::new(FileSystemPersistence::open(layout.clone(), parser).unwrap());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = ShardWatcher::start(
            Arc::clone(&store),
            HashSet::from(["local".to_string()]),
            tx,
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let local = layout.shard_path("t1", date, "local").unwrap();
        let remote = layout.shard_path("t1", date, "remote").unwrap();
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, encode_lines(&[Operation::new_move(1, "local", "mine", None)])).unwrap();
        std::fs::write(&remote, encode_lines(&[Operation::new_move(1, "remote", "theirs", None)])).unwrap();

        let incoming = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no incoming ops before timeout")
            .unwrap();
        assert_eq!(incoming.tree_id, "t1");
        assert_eq!(incoming.origin_id, "remote");
        assert_eq!(incoming.ops, vec![Operation::new_move(1, "remote", "theirs", None)]);
    }
}
