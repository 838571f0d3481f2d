//! Environment variable source: SPACEKEEP__* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// Uses SPACEKEEP prefix and __ as separator for nested keys, so the logging
/// shortcuts (`SPACEKEEP_LOG`, `SPACEKEEP_LOG_FORMAT`) never collide with it.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("SPACEKEEP")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
