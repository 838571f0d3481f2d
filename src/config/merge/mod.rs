//! Source composition

pub mod service;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

use crate::op::parser::DEFAULT_PARSE_TIMEOUT_MS;
use crate::persist::autosave::DEFAULT_AUTOSAVE_INTERVAL_MS;

/// Builder seeded with the values every layer overrides.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    config::Config::builder()
        .set_default("parser.timeout_ms", DEFAULT_PARSE_TIMEOUT_MS)?
        .set_default("queue.autosave_interval_ms", DEFAULT_AUTOSAVE_INTERVAL_MS)
}
