//! Durable persistence
//!
//! [`SpacePersistence`] is the durable-write collaborator the queue flushes into.
//! [`fs::FileSystemPersistence`] is the on-disk implementation; tests substitute
//! in-memory or failing ones.

pub mod autosave;
pub mod fs;
pub mod queue;
pub mod watch;

pub use autosave::AutoSaver;
pub use fs::FileSystemPersistence;
pub use queue::{PersistenceQueue, SaveReport};
pub use watch::{IncomingOps, ShardWatcher};

use crate::error::StorageError;
use crate::op::Operation;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Secrets as stored: key -> value
pub type SecretMap = BTreeMap<String, String>;

/// Durable storage for one or more spaces.
///
/// A call that returns `Ok` means the data is durable as far as the backend can tell.
#[async_trait]
pub trait SpacePersistence: Send + Sync {
    /// Append operations to a tree's log, in the given order.
    async fn append_tree_ops(
        &self,
        space_id: &str,
        tree_id: &str,
        ops: &[Operation],
    ) -> Result<(), StorageError>;

    /// Every operation recorded for a tree.
    async fn get_tree_ops(&self, space_id: &str, tree_id: &str)
        -> Result<Vec<Operation>, StorageError>;

    /// Record secrets; keys not in `secrets` are left as they are.
    async fn save_all_secrets(&self, space_id: &str, secrets: &SecretMap)
        -> Result<(), StorageError>;

    async fn get_all_secrets(&self, space_id: &str) -> Result<SecretMap, StorageError>;
}
