//! File-system persistence
//!
//! Operations are appended to one shard per tree, per UTC day, per origin. Secrets are
//! a single JSON map replaced as a whole through a temp file and a rename.

use super::{SecretMap, SpacePersistence};
use crate::concurrency::TreeLockManager;
use crate::error::StorageError;
use crate::op::{encode_lines, Operation, OpsParser};
use crate::space::{ShardPath, SpaceLayout};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Durable store for a single space directory
pub struct FileSystemPersistence {
    layout: SpaceLayout,
    space_id: String,
    parser: Arc<OpsParser>,
    tree_locks: TreeLockManager,
    secrets_lock: tokio::sync::Mutex<()>,
}

impl FileSystemPersistence {
    pub fn new(layout: SpaceLayout, space_id: impl Into<String>, parser: Arc<OpsParser>) -> Self {
        Self {
            layout,
            space_id: space_id.into(),
            parser,
            tree_locks: TreeLockManager::new(),
            secrets_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open an initialized space, taking the space id from its manifest.
    pub fn open(layout: SpaceLayout, parser: Arc<OpsParser>) -> Result<Self, StorageError> {
        let manifest = layout.read_manifest()?;
        Ok(Self::new(layout, manifest.id, parser))
    }

    pub fn layout(&self) -> &SpaceLayout {
        &self.layout
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    pub fn parser(&self) -> &Arc<OpsParser> {
        &self.parser
    }

    fn check_space(&self, space_id: &str) -> Result<(), StorageError> {
        if space_id == self.space_id {
            Ok(())
        } else {
            Err(StorageError::UnknownSpace {
                requested: space_id.to_string(),
                served: self.space_id.clone(),
            })
        }
    }

    /// Append `ops` to the shards dated `date`, one shard per origin.
    ///
    /// Every shard path is resolved before the first write. Origins that cannot name a
    /// shard file are never written; if any are present, or a write fails after an
    /// earlier origin landed, the error is [`StorageError::PartialAppend`] naming what
    /// reached disk and what was rejected.
    pub async fn append_tree_ops_on(
        &self,
        tree_id: &str,
        date: NaiveDate,
        ops: &[Operation],
    ) -> Result<(), StorageError> {
        if ops.is_empty() {
            return Ok(());
        }
        self.layout.tree_ops_dir(tree_id)?;

        let mut shards = Vec::new();
        let mut rejected_origins = Vec::new();
        let mut first_rejection = None;
        for (origin_id, group) in group_by_origin(ops) {
            match self.layout.shard_path(tree_id, date, origin_id) {
                Ok(path) => shards.push((origin_id, path, group)),
                Err(e) => {
                    warn!(tree_id, origin_id, error = %e, "Origin cannot name a shard file");
                    rejected_origins.push(origin_id.to_string());
                    first_rejection.get_or_insert(e);
                }
            }
        }

        let _guard = self.tree_locks.lock(tree_id).await;
        let mut written_origins = Vec::new();
        for (origin_id, path, group) in shards {
            if let Err(e) = append_shard(&path, &group).await {
                if written_origins.is_empty() && rejected_origins.is_empty() {
                    return Err(e);
                }
                return Err(StorageError::PartialAppend {
                    written_origins,
                    rejected_origins,
                    source: Box::new(e),
                });
            }
            debug!(
                tree_id,
                origin_id,
                count = group.len(),
                shard = %path.display(),
                "Appended operations to shard"
            );
            written_origins.push(origin_id.to_string());
        }

        match first_rejection {
            None => Ok(()),
            Some(e) => Err(StorageError::PartialAppend {
                written_origins,
                rejected_origins,
                source: Box::new(e),
            }),
        }
    }

    /// Operations of one shard file.
    pub async fn read_shard(&self, path: &Path, origin_id: &str) -> Result<Vec<Operation>, StorageError> {
        let content = tokio::fs::read_to_string(path).await?;
        let lines = content.lines().map(str::to_string).collect();
        Ok(self.parser.parse_lines(lines, origin_id).await?)
    }

    /// Shard files of a tree, oldest day first, origins sorted within a day.
    pub async fn list_tree_shards(&self, tree_id: &str) -> Result<Vec<(PathBuf, ShardPath)>, StorageError> {
        let tree_dir = self.layout.tree_ops_dir(tree_id)?;
        if !tokio::fs::try_exists(&tree_dir).await? {
            return Ok(Vec::new());
        }

        let walked = tokio::task::spawn_blocking(move || collect_shards(&tree_dir))
            .await
            .map_err(|e| StorageError::IoError(std::io::Error::other(e)))?;
        let mut shards: Vec<(PathBuf, ShardPath)> = walked
            .into_iter()
            .filter(|(_, shard)| shard.tree_id == tree_id)
            .collect();
        shards.sort_by(|(_, a), (_, b)| a.date.cmp(&b.date).then_with(|| a.origin_id.cmp(&b.origin_id)));
        Ok(shards)
    }

    async fn write_secrets_file(&self, secrets: &SecretMap) -> Result<(), StorageError> {
        let path = self.layout.secrets_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(secrets)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_secrets_file(&self) -> Result<SecretMap, StorageError> {
        let path = self.layout.secrets_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(SecretMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SecretMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SpacePersistence for FileSystemPersistence {
    async fn append_tree_ops(
        &self,
        space_id: &str,
        tree_id: &str,
        ops: &[Operation],
    ) -> Result<(), StorageError> {
        self.check_space(space_id)?;
        self.append_tree_ops_on(tree_id, Utc::now().date_naive(), ops)
            .await
    }

    async fn get_tree_ops(&self, space_id: &str, tree_id: &str) -> Result<Vec<Operation>, StorageError> {
        self.check_space(space_id)?;

        let mut all_ops = Vec::new();
        for (path, shard) in self.list_tree_shards(tree_id).await? {
            match self.read_shard(&path, &shard.origin_id).await {
                Ok(ops) => all_ops.extend(ops),
                Err(e) => {
                    error!(
                        tree_id,
                        shard = %path.display(),
                        error = %e,
                        "Failed to read operation shard, skipping"
                    );
                }
            }
        }
        Ok(all_ops)
    }

    async fn save_all_secrets(&self, space_id: &str, secrets: &SecretMap) -> Result<(), StorageError> {
        self.check_space(space_id)?;
        if secrets.is_empty() {
            return Ok(());
        }

        let _guard = self.secrets_lock.lock().await;
        let mut stored = self.read_secrets_file().await?;
        stored.extend(secrets.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_secrets_file(&stored).await?;
        debug!(count = secrets.len(), "Saved secrets");
        Ok(())
    }

    async fn get_all_secrets(&self, space_id: &str) -> Result<SecretMap, StorageError> {
        self.check_space(space_id)?;
        self.read_secrets_file().await
    }
}

async fn append_shard(path: &Path, group: &[&Operation]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(encode_lines(group.iter().copied()).as_bytes())
        .await?;
    file.flush().await?;
    Ok(())
}

/// Split ops into per-origin runs, keeping first-seen origin order and op order.
/// Transient ops are left out.
fn group_by_origin(ops: &[Operation]) -> Vec<(&str, Vec<&Operation>)> {
    let mut groups: Vec<(&str, Vec<&Operation>)> = Vec::new();
    for op in ops.iter().filter(|op| !op.is_transient()) {
        let origin = op.origin_id();
        match groups.iter_mut().find(|(o, _)| *o == origin) {
            Some((_, group)) => group.push(op),
            None => groups.push((origin, vec![op])),
        }
    }
    groups
}

fn collect_shards(tree_dir: &Path) -> Vec<(PathBuf, ShardPath)> {
    let mut shards = Vec::new();
    for entry in WalkDir::new(tree_dir).min_depth(4).max_depth(4) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %tree_dir.display(), error = %e, "Failed to read shard directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(shard) = ShardPath::parse(entry.path()) {
            shards.push((entry.into_path(), shard));
        }
    }
    shards
}
