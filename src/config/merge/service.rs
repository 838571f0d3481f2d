//! MergeService: orchestrates sources and deserializes to SpacekeepConfig.

use crate::config::sources::{environment, space_file};
use crate::config::SpacekeepConfig;
use config::{ConfigError, File};
use std::path::Path;

use super::builder_with_defaults;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> space file -> explicit file -> environment (highest).
    pub fn load(space_root: &Path, file: Option<&Path>) -> Result<SpacekeepConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = space_file::add_to_builder(builder, space_root)?;
        let builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}
