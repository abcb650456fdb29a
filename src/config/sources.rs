//! Configuration sources: the `ctxsync.toml` file and `CTXSYNC__*` environment variables.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "ctxsync.toml";
pub const ENV_PREFIX: &str = "CTXSYNC";

/// Add a TOML file to the builder.
pub fn add_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !required && !path.exists() {
        debug!(config_path = %path.display(), "No configuration file, using defaults");
        return Ok(builder);
    }
    Ok(builder.add_source(
        File::from(path)
            .format(FileFormat::Toml)
            .required(required),
    ))
}

/// Add `CTXSYNC__SECTION__KEY` overrides, e.g. `CTXSYNC__REGISTRY__MIN_VALID_HANDLE=8192`.
pub fn add_environment(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    ))
}
