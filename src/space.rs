//! Space layout
//!
//! Where a space keeps its manifest, operation shards, secrets and blobs on disk.
//!
//! ```text
//! <root>/space.md
//! <root>/space-v1/space.json
//! <root>/space-v1/ops/<treeId>/<YYYY>/<MM>/<DD>/<originId>.jsonl
//! <root>/space-v1/secrets
//! <root>/space-v1/files/sha256/<xx>/<rest>
//! ```

use crate::error::StorageError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::info;

pub const SPACE_MARKER_FILE: &str = "space.md";
pub const SPACE_DIR: &str = "space-v1";
pub const MANIFEST_FILE: &str = "space.json";
pub const OPS_DIR: &str = "ops";
pub const SECRETS_FILE: &str = "secrets";
pub const FILES_DIR: &str = "files";
pub const SHARD_EXTENSION: &str = "jsonl";

const MARKER_TEXT: &str = "# Space\n\n\
This directory holds a replicated space. Do not rename or edit the 'space-v1' \
folder; the application needs it exactly as it is.\n";

/// Contents of `space.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceManifest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Paths of one space rooted at a directory
#[derive(Debug, Clone)]
pub struct SpaceLayout {
    root: PathBuf,
}

impl SpaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(SPACE_MARKER_FILE)
    }

    pub fn space_dir(&self) -> PathBuf {
        self.root.join(SPACE_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.space_dir().join(MANIFEST_FILE)
    }

    pub fn ops_dir(&self) -> PathBuf {
        self.space_dir().join(OPS_DIR)
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.space_dir().join(SECRETS_FILE)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.space_dir().join(FILES_DIR)
    }

    pub fn tree_ops_dir(&self, tree_id: &str) -> Result<PathBuf, StorageError> {
        validate_component("tree id", tree_id)?;
        Ok(self.ops_dir().join(tree_id))
    }

    /// `ops/<treeId>/<YYYY>/<MM>/<DD>/<originId>.jsonl`
    pub fn shard_path(
        &self,
        tree_id: &str,
        date: NaiveDate,
        origin_id: &str,
    ) -> Result<PathBuf, StorageError> {
        validate_component("origin id", origin_id)?;
        Ok(self
            .tree_ops_dir(tree_id)?
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
            .join(format!("{origin_id}.{SHARD_EXTENSION}")))
    }

    /// Create the directory structure, marker and manifest if they are missing.
    ///
    /// An existing manifest is left untouched and returned.
    pub fn init(&self, space_id: &str, name: Option<&str>) -> Result<SpaceManifest, StorageError> {
        std::fs::create_dir_all(self.ops_dir())?;
        std::fs::create_dir_all(self.files_dir())?;

        let marker = self.marker_path();
        if !marker.exists() {
            std::fs::write(&marker, MARKER_TEXT)?;
        }

        let manifest_path = self.manifest_path();
        if manifest_path.exists() {
            return self.read_manifest();
        }

        let manifest = SpaceManifest {
            id: space_id.to_string(),
            name: name.map(str::to_string),
            created_at: Some(Utc::now()),
        };
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;
        info!(space_id, root = %self.root.display(), "Initialized space");
        Ok(manifest)
    }

    pub fn read_manifest(&self) -> Result<SpaceManifest, StorageError> {
        let path = self.manifest_path();
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::Manifest(format!("no space manifest at {}", path.display()))
            } else {
                StorageError::IoError(e)
            }
        })?;
        let manifest: SpaceManifest = serde_json::from_slice(&bytes)?;
        if manifest.id.is_empty() {
            return Err(StorageError::Manifest(format!(
                "manifest {} has an empty id",
                path.display()
            )));
        }
        Ok(manifest)
    }

    pub fn is_space(&self) -> bool {
        self.manifest_path().is_file()
    }
}

/// Identity of a shard recovered from its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPath {
    pub tree_id: String,
    pub date: NaiveDate,
    pub origin_id: String,
}

impl ShardPath {
    /// Parse `<...>/ops/<treeId>/<YYYY>/<MM>/<DD>/<originId>.jsonl`.
    pub fn parse(path: &Path) -> Option<ShardPath> {
        if path.extension()? != SHARD_EXTENSION {
            return None;
        }
        let origin_id = path.file_stem()?.to_str()?.to_string();

        let mut dirs = path.parent()?.components().rev().filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        });
        let day = digits(dirs.next()?, 2)?;
        let month = digits(dirs.next()?, 2)?;
        let year = digits(dirs.next()?, 4)?;
        let tree_id = dirs.next()?.to_string();
        if dirs.next()? != OPS_DIR {
            return None;
        }

        let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
        if origin_id.is_empty() {
            return None;
        }
        Some(ShardPath {
            tree_id,
            date,
            origin_id,
        })
    }
}

fn digits(segment: &str, width: usize) -> Option<u32> {
    if segment.len() == width && segment.bytes().all(|b| b.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

/// Ids become path segments: keep them to one plain segment.
pub fn validate_component(kind: &'static str, value: &str) -> Result<(), StorageError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if bad {
        Err(StorageError::InvalidPathComponent {
            kind,
            value: value.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shard_path_layout() {
        let layout = SpaceLayout::new("/spaces/s1");
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let path = layout.shard_path("tree-1", date, "peerA").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/spaces/s1/space-v1/ops/tree-1/2024/03/07/peerA.jsonl")
        );
        assert_eq!(
            ShardPath::parse(&path),
            Some(ShardPath {
                tree_id: "tree-1".to_string(),
                date,
                origin_id: "peerA".to_string(),
            })
        );
    }

    #[test]
    fn test_shard_path_rejects_other_files() {
        assert_eq!(ShardPath::parse(Path::new("/s/space-v1/secrets")), None);
        assert_eq!(
            ShardPath::parse(Path::new("/s/space-v1/ops/t/2024/3/07/a.jsonl")),
            None
        );
        assert_eq!(
            ShardPath::parse(Path::new("/s/space-v1/ops/t/2024/02/30/a.jsonl")),
            None
        );
        assert_eq!(
            ShardPath::parse(Path::new("/s/space-v1/other/t/2024/02/03/a.jsonl")),
            None
        );
    }

    #[test]
    fn test_ids_must_be_single_segments() {
        let layout = SpaceLayout::new("/s");
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(layout.shard_path("../escape", date, "a").is_err());
        assert!(layout.shard_path("t", date, "a/b").is_err());
        assert!(layout.shard_path("", date, "a").is_err());
        assert!(layout.tree_ops_dir("..").is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = SpaceLayout::new(temp.path());

        let first = layout.init("space-1", Some("Notes")).unwrap();
        assert!(layout.marker_path().is_file());
        assert!(layout.ops_dir().is_dir());
        assert!(layout.files_dir().is_dir());
        assert!(layout.is_space());

        let second = layout.init("other-id", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(layout.read_manifest().unwrap().id, "space-1");

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(layout.manifest_path()).unwrap()).unwrap();
        assert!(raw.get("createdAt").is_some());
        assert_eq!(raw.get("name").and_then(|v| v.as_str()), Some("Notes"));
    }

    #[test]
    fn test_read_manifest_missing() {
        let temp = TempDir::new().unwrap();
        let layout = SpaceLayout::new(temp.path());
        assert!(matches!(layout.read_manifest(), Err(StorageError::Manifest(_))));
    }
}
