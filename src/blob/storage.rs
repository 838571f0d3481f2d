//! Blob storage on disk
//!
//! Layout: `<files>/sha256/<xx>/<rest>`, where `xx` is the first digest byte in hex.
//! Writes land in a temp file next to their destination and are renamed into place,
//! so readers never observe a partial blob.

use super::{BlobId, BlobRef};
use crate::error::StorageError;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const ALGORITHM_DIR: &str = "sha256";

/// Media type used when reading a blob back as a data URL without a known type
pub const DEFAULT_DATA_URL_MIME: &str = "application/octet-stream";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content-addressable store rooted at a space's `files` directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: files_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, id: &BlobId) -> PathBuf {
        let (prefix, rest) = id.shard_parts();
        self.root.join(ALGORITHM_DIR).join(prefix).join(rest)
    }

    /// Store bytes, returning their id. Storing the same bytes again is a no-op.
    pub async fn put_bytes(
        &self,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> Result<BlobRef, StorageError> {
        let id = BlobId::for_bytes(bytes);
        let path = self.blob_path(&id);
        let blob = BlobRef {
            id,
            size: bytes.len() as u64,
            mime_type: mime_type.map(str::to_string),
        };

        if tokio::fs::try_exists(&path).await? {
            debug!(blob_id = %blob.id, "Blob already stored");
            return Ok(blob);
        }

        let Some(dir) = path.parent() else {
            return Err(StorageError::InvalidBlobId(blob.id.to_string()));
        };
        tokio::fs::create_dir_all(dir).await?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            blob.id.shard_parts().1,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let written = write_file(&tmp, bytes).await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        // Another writer may have won the race; identical bytes either way.
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            if !tokio::fs::try_exists(&path).await? {
                return Err(e.into());
            }
        }

        debug!(blob_id = %blob.id, size = blob.size, "Stored blob");
        Ok(blob)
    }

    /// Read a blob back, checking its digest.
    pub async fn get_bytes(&self, id: &BlobId) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = hex::encode(Sha256::digest(&bytes));
        if actual != id.hex() {
            return Err(StorageError::DigestMismatch {
                id: id.to_string(),
                actual,
            });
        }
        Ok(bytes)
    }

    pub async fn exists(&self, id: &BlobId) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.blob_path(id)).await?)
    }

    /// Store the payload of a `data:<mime>;base64,<payload>` URL.
    pub async fn put_data_url(&self, data_url: &str) -> Result<BlobRef, StorageError> {
        let (mime_type, bytes) = parse_data_url(data_url)?;
        self.put_bytes(&bytes, mime_type).await
    }

    /// Read a blob as a base64 data URL, typed `application/octet-stream` unless given.
    pub async fn get_data_url(
        &self,
        id: &BlobId,
        mime_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let bytes = self.get_bytes(id).await?;
        Ok(format!(
            "data:{};base64,{}",
            mime_type.unwrap_or(DEFAULT_DATA_URL_MIME),
            BASE64_STANDARD.encode(bytes)
        ))
    }
}

fn parse_data_url(data_url: &str) -> Result<(Option<&str>, Vec<u8>), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidDataUrl(reason.to_string());

    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| invalid("missing data: scheme"))?;
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| invalid("only base64 data URLs are supported"))?;
    if mime_type.contains(';') {
        return Err(invalid("media type parameters are not supported"));
    }
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| invalid(&format!("bad base64 payload: {e}")))?;

    let mime_type = Some(mime_type).filter(|m| !m.is_empty());
    Ok((mime_type, bytes))
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}
