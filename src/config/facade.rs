//! Entry point for loading a validated [`SyncConfig`].

use super::merge::builder_with_defaults;
use super::sources::{add_environment, add_file, CONFIG_FILE_NAME};
use super::SyncConfig;
use crate::error::SyncError;
use std::path::Path;
use tracing::{debug, error};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then `ctxsync.toml` in `dir` if present, then the environment.
    pub fn load(dir: &Path) -> Result<SyncConfig, SyncError> {
        Self::build(&dir.join(CONFIG_FILE_NAME), false)
    }

    /// Defaults, then the given file (which must exist), then the environment.
    pub fn load_from_file(path: &Path) -> Result<SyncConfig, SyncError> {
        Self::build(path, true)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<SyncConfig, SyncError> {
        let config = builder_with_defaults()?.build()?;
        Ok(config.try_deserialize()?)
    }

    fn build(path: &Path, required: bool) -> Result<SyncConfig, SyncError> {
        let builder = builder_with_defaults()?;
        let builder = add_file(builder, path, required)?;
        let builder = add_environment(builder)?;
        let config: SyncConfig = builder.build()?.try_deserialize()?;

        if let Err(errors) = config.validate() {
            for e in &errors {
                error!(error = %e, "Invalid configuration");
            }
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SyncError::Config(joined));
        }
        debug!(config_path = %path.display(), compat_entries = config.compat.len(), "Configuration loaded");
        Ok(config)
    }
}
