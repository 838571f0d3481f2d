//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::SpacekeepConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a space, with the environment overlay.
    pub fn load(space_root: &Path) -> Result<SpacekeepConfig, ConfigError> {
        MergeService::load(space_root, None)
    }

    /// Load configuration for a space, adding an explicit file above the space file.
    pub fn load_with_file(
        space_root: &Path,
        file: Option<&Path>,
    ) -> Result<SpacekeepConfig, ConfigError> {
        MergeService::load(space_root, file)
    }

    /// Create default configuration.
    pub fn default() -> SpacekeepConfig {
        SpacekeepConfig::default()
    }
}
