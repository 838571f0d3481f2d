//! Error types
//!
//! One enum per layer: line decoding, the parser worker round trip, durable storage,
//! and the top-level API used by the CLI and configuration.

use thiserror::Error;

/// A single log line could not be turned into an operation.
///
/// Always isolated to its line: the batch it belongs to keeps going.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("operation line is not a JSON array")]
    NotAnArray,

    #[error("operation line is missing its tag")]
    MissingTag,

    #[error("unknown operation tag: {0:?}")]
    UnknownTag(String),

    #[error("'{tag}' tuple expects {expected} fields, found {found}")]
    Arity {
        tag: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// The parser worker round trip failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("operation parsing timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("ops parser destroyed")]
    Destroyed,

    #[error("ops parser worker stopped unexpectedly")]
    WorkerGone,
}

/// Durable storage errors (log shards, secrets, blobs, space layout).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob id: {0:?}")]
    InvalidBlobId(String),

    #[error("unsupported data URL: {0}")]
    InvalidDataUrl(String),

    #[error("digest mismatch for {id}: stored bytes hash to {actual}")]
    DigestMismatch { id: String, actual: String },

    #[error("invalid path component for {kind}: {value:?}")]
    InvalidPathComponent { kind: &'static str, value: String },

    #[error("unknown space {requested:?} (this store serves {served:?})")]
    UnknownSpace { requested: String, served: String },

    #[error("space manifest error: {0}")]
    Manifest(String),

    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Some origin groups of a tree batch reached disk before the write stopped.
    #[error("append stopped after {} of the batch's origins: {source}", written_origins.len())]
    PartialAppend {
        written_origins: Vec<String>,
        rejected_origins: Vec<String>,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether writing the same data again can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::InvalidPathComponent { .. }
            | StorageError::InvalidBlobId(_)
            | StorageError::InvalidDataUrl(_) => false,
            StorageError::PartialAppend { source, .. } => source.is_retryable(),
            _ => true,
        }
    }
}

/// Top-level error for the CLI, configuration and logging setup.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("save failed: {0}")]
    SaveFailed(String),

    #[error(transparent)]
    StorageError(#[from] StorageError),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<ParserError> for ApiError {
    fn from(err: ParserError) -> Self {
        ApiError::StorageError(StorageError::Parser(err))
    }
}
