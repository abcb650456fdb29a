//! Error types for execution-context synchronization.

use crate::types::{ProgramType, UninitializeReason};
use thiserror::Error;

/// Error codes stored in a context's `dll_error` field and reported to the host.
pub mod codes {
    pub const NO_ERROR: i32 = 0;
    pub const ERR_RUNTIME_ERROR: i32 = 4000;
    pub const ERR_ILLEGAL_STATE: i32 = 65544;
    pub const ERR_INVALID_PARAMETER: i32 = 65545;
    pub const ERR_HOST_FAILURE: i32 = 65546;
    pub const ERR_CONFIG: i32 = 65547;
}

/// Failures of host-provided services.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Window enumeration failed: {0}")]
    Enumeration(String),

    #[error("Unknown window handle: {0}")]
    UnknownWindow(u32),

    #[error("Host service unavailable: {0}")]
    Unavailable(String),
}

/// A resolver input combination outside the known decision matrix.
///
/// Reported, never absorbed: newer host builds may legitimately produce such combinations,
/// so callers get enough detail to extend the compatibility table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Unexpected uninit reason {uninit_reason} for {program_type} (super={has_super}, testing={testing}, visual={visual_mode}, build={build}): {detail}"
)]
pub struct ResolveAnomaly {
    pub program_type: ProgramType,
    pub uninit_reason: UninitializeReason,
    pub has_super: bool,
    pub testing: bool,
    pub visual_mode: bool,
    pub build: u32,
    pub detail: String,
}

/// Errors raised by the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Illegal state: {0}")]
    Anomaly(#[from] ResolveAnomaly),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Host error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            SyncError::InvalidArgument(_) => codes::ERR_INVALID_PARAMETER,
            SyncError::IllegalState(_) | SyncError::Anomaly(_) => codes::ERR_ILLEGAL_STATE,
            SyncError::Runtime(_) => codes::ERR_RUNTIME_ERROR,
            SyncError::Host(_) => codes::ERR_HOST_FAILURE,
            SyncError::Config(_) => codes::ERR_CONFIG,
        }
    }

    /// Resolver anomalies leave the registry untouched; the host may continue.
    pub fn is_anomaly(&self) -> bool {
        matches!(self, SyncError::Anomaly(_))
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
