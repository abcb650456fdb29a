//! Merge rules: defaults first, every later source overrides.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")?
        .set_default("programs.enabled", true)?
        .set_default("programs.level", "info")?
        .set_default("registry.min_valid_handle", 0x1000)
}
