//! Execution context: the per-module record shared between the host and every module of a
//! program.

pub mod wire;

use crate::types::{
    DeinitFlags, Hwnd, InitFlags, InitializeReason, LaunchType, ModuleType, Phase, ProgramId,
    ProgramType, ThreadId, Timeframe, UninitializeReason,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// A context as held by its module instance and, by reference, by the chain registry.
pub type SharedContext = Arc<RwLock<ExecutionContext>>;

/// Tester state of a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFlags {
    pub testing: bool,
    pub visual_mode: bool,
    pub optimization: bool,
}

impl TestFlags {
    /// Running in the tester without visual replay: there is no chart.
    pub fn is_headless(&self) -> bool {
        self.testing && !self.visual_mode
    }
}

/// Per-program logging configuration, fixed on the program's first init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramLogSettings {
    /// Program logging on/off
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum level written by the program: trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,

    /// Program-specific log file, if any
    #[serde(default)]
    pub custom_log_file: Option<PathBuf>,

    /// Also forward program messages to the host's terminal log
    #[serde(default = "default_true")]
    pub mirror_to_terminal: bool,
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for ProgramLogSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_level(),
            custom_log_file: None,
            mirror_to_terminal: default_true(),
        }
    }
}

/// Execution context of one module instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub pid: Option<ProgramId>,
    /// Id of the program this module belonged to before its last reattachment
    pub previous_pid: Option<ProgramId>,

    pub program_type: Option<ProgramType>,
    pub program_name: String,
    pub module_type: Option<ModuleType>,
    pub module_name: String,
    pub launch_type: Option<LaunchType>,
    /// Program that started this one programmatically
    pub super_pid: Option<ProgramId>,

    pub init_flags: InitFlags,
    pub deinit_flags: DeinitFlags,

    pub phase: Phase,
    pub init_reason: Option<InitializeReason>,
    pub uninit_reason: UninitializeReason,

    pub symbol: String,
    pub timeframe: Option<Timeframe>,
    pub chart: Hwnd,
    pub chart_window: Hwnd,

    pub test: TestFlags,
    pub thread_id: ThreadId,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,

    pub mql_error: i32,
    pub dll_error: i32,

    pub logging: ProgramLogSettings,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into the shared form handed to the registry.
    pub fn into_shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    pub fn is_library(&self) -> bool {
        self.module_type == Some(ModuleType::Library)
    }

    pub fn is_main(&self) -> bool {
        matches!(self.module_type, Some(t) if t != ModuleType::Library)
    }
}
