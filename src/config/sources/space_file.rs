//! Per-space file source: `<space>/spacekeep.toml`, optional

use crate::config::SPACE_CONFIG_FILE;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    space_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = space_root.join(SPACE_CONFIG_FILE);
    Ok(builder.add_source(File::from(path).required(false)))
}
