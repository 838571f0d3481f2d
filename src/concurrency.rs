//! Per-tree write serialization
//!
//! Appends for the same tree go to the same day's shard file, so they must not
//! interleave. Different trees never wait on each other.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-tree async lock manager
///
/// The map itself is guarded by a sync lock that is never held across an await;
/// the per-tree locks are async so a writer can hold one across file I/O.
pub struct TreeLockManager {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl TreeLockManager {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    fn tree_lock(&self, tree_id: &str) -> Arc<Mutex<()>> {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(tree_id) {
                return Arc::clone(lock);
            }
        }

        // Double-check under the write lock; another task may have inserted it.
        let mut map = self.locks.write();
        Arc::clone(
            map.entry(tree_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Wait for exclusive write access to one tree.
    pub async fn lock(&self, tree_id: &str) -> OwnedMutexGuard<()> {
        self.tree_lock(tree_id).lock_owned().await
    }
}

impl Default for TreeLockManager {
    fn default() -> Self {
        Self::new()
    }
}
