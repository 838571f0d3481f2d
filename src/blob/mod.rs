//! Content-addressed blobs
//!
//! Attachments are stored once per distinct content and referenced from vertex
//! properties by their [`BlobId`] (`sha256:<hex>`). Blobs are immutable: new content
//! always means a new id.

pub mod storage;

pub use storage::BlobStore;

use crate::error::StorageError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const ALGORITHM_PREFIX: &str = "sha256:";
const DIGEST_HEX_LEN: usize = 64;

/// Digest-derived blob identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId {
    hex: String,
}

impl BlobId {
    /// Id of exactly these bytes
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self {
            hex: hex::encode(Sha256::digest(bytes)),
        }
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidBlobId(s.to_string());
        let hex = s.strip_prefix(ALGORITHM_PREFIX).ok_or_else(invalid)?;
        let well_formed = hex.len() == DIGEST_HEX_LEN
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(invalid());
        }
        Ok(Self {
            hex: hex.to_string(),
        })
    }

    /// Lowercase hex digest without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// `(<first byte>, <rest>)` as used for the on-disk fan-out
    pub fn shard_parts(&self) -> (&str, &str) {
        self.hex.split_at(2)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ALGORITHM_PREFIX}{}", self.hex)
    }
}

impl FromStr for BlobId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlobId::parse(s)
    }
}

impl Serialize for BlobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlobId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// What `put_bytes` hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    pub id: BlobId,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let id = BlobId::for_bytes(b"abc");
        assert_eq!(
            id.to_string(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(id.shard_parts().0, "ba");
        assert_eq!(id.shard_parts().1.len(), 62);
    }

    #[test]
    fn test_parse_round_trip_and_rejects() {
        let id = BlobId::for_bytes(b"");
        assert_eq!(BlobId::parse(&id.to_string()).unwrap(), id);

        assert!(BlobId::parse(id.hex()).is_err());
        assert!(BlobId::parse("sha256:abc").is_err());
        assert!(BlobId::parse(&format!("sha256:{}", id.hex().to_uppercase())).is_err());
        assert!(BlobId::parse(&format!("md5:{}", id.hex())).is_err());
        assert!(BlobId::parse(&format!("sha256:{}/..", &id.hex()[..61])).is_err());
    }

    #[test]
    fn test_blob_ref_json() {
        let blob = BlobRef {
            id: BlobId::for_bytes(b"x"),
            size: 1,
            mime_type: Some("text/plain".to_string()),
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["mimeType"], "text/plain");
        assert!(json["id"].as_str().unwrap().starts_with("sha256:"));
    }
}
