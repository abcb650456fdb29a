//! Configuration
//!
//! Layered configuration: built-in defaults, an optional `ctxsync.toml`, then `CTXSYNC__*`
//! environment variables. Tests included.

use crate::compat::CompatEntry;
use crate::context::ProgramLogSettings;
use crate::logging::{LoggingConfig, LOG_LEVELS};
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Diagnostics logging of the crate itself
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Logging defaults handed to programs on their first init
    #[serde(default)]
    pub programs: ProgramLogSettings,

    /// Host build quirks in addition to the built-in table
    #[serde(default)]
    pub compat: Vec<CompatEntry>,

    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Raw handles below this value are rejected at the host boundary
    #[serde(default = "default_min_valid_handle")]
    pub min_valid_handle: u32,
}

fn default_min_valid_handle() -> u32 {
    0x1000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_valid_handle: default_min_valid_handle(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Logging(String),
    Programs(String),
    Compat(usize, String),
    Registry(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
            ValidationError::Programs(msg) => write!(f, "Programs: {}", msg),
            ValidationError::Compat(index, msg) => write!(f, "Compat entry {}: {}", index, msg),
            ValidationError::Registry(msg) => write!(f, "Registry: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SyncConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown level '{}'",
                self.logging.level
            )));
        }
        for (module, level) in &self.logging.modules {
            if !LOG_LEVELS.contains(&level.as_str()) {
                errors.push(ValidationError::Logging(format!(
                    "unknown level '{}' for module '{}'",
                    level, module
                )));
            }
        }
        if !LOG_LEVELS.contains(&self.programs.level.as_str()) {
            errors.push(ValidationError::Programs(format!(
                "unknown level '{}'",
                self.programs.level
            )));
        }
        if let Some(file) = &self.programs.custom_log_file {
            if file.as_os_str().is_empty() {
                errors.push(ValidationError::Programs(
                    "custom log file cannot be empty".to_string(),
                ));
            }
        }
        for (index, entry) in self.compat.iter().enumerate() {
            if let Err(e) = entry.validate() {
                errors.push(ValidationError::Compat(index, e));
            }
        }
        if self.registry.min_valid_handle == 0 {
            errors.push(ValidationError::Registry(
                "min_valid_handle must be positive".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
