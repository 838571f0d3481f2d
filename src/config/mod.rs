//! Configuration
//!
//! Layered with the `config` crate. Precedence, lowest first: built-in defaults,
//! `<space>/spacekeep.toml`, an explicitly named file, then `SPACEKEEP__*` environment
//! variables (`SPACEKEEP__PARSER__TIMEOUT_MS=2000`).

mod facade;
pub mod merge;
pub mod sources;

pub use facade::ConfigLoader;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::op::parser::DEFAULT_PARSE_TIMEOUT_MS;
use crate::persist::autosave::DEFAULT_AUTOSAVE_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the per-space config file, looked up in the space root
pub const SPACE_CONFIG_FILE: &str = "spacekeep.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpacekeepConfig {
    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SpacekeepConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.parser.timeout_ms == 0 {
            return Err(ApiError::ConfigError(
                "parser.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.queue.autosave_interval_ms == 0 {
            return Err(ApiError::ConfigError(
                "queue.autosave_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ops parser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Per-request deadline for a parse round trip
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ParserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Persistence queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,
}

impl QueueConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: default_autosave_interval_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PARSE_TIMEOUT_MS
}

fn default_autosave_interval_ms() -> u64 {
    DEFAULT_AUTOSAVE_INTERVAL_MS
}
