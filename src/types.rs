//! Identifiers and closed enumerations shared across the crate.
//!
//! Numeric values mirror the codes the host passes across the module boundary, so the
//! discriminants are part of the wire format (see [`crate::context::wire`]).

use crate::error::SyncError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use strum::{Display, EnumIter, EnumString};

/// Program id: the position of a program's chain in the registry.
///
/// Zero is reserved so that an unset id can never alias a real chain; in the context it is
/// represented as `Option<ProgramId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(NonZeroU32);

impl ProgramId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(ProgramId)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Raw value as stored in the wire record, 0 when unset.
    pub fn raw(id: Option<ProgramId>) -> u32 {
        id.map(ProgramId::get).unwrap_or(0)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Native thread identifier as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Native window-surface handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hwnd(pub u32);

impl Hwnd {
    /// No surface: unset, or the program runs headless.
    pub const NONE: Hwnd = Hwnd(0);
    /// Returned by the host-facing accessors on failure.
    pub const INVALID: Hwnd = Hwnd(u32::MAX);

    pub fn is_set(self) -> bool {
        self != Hwnd::NONE && self != Hwnd::INVALID
    }
}

impl fmt::Display for Hwnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind of a program (the type of its main module).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum ProgramType {
    Indicator = 1,
    Expert = 2,
    Script = 4,
}

impl ProgramType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ProgramType::Indicator),
            2 => Some(ProgramType::Expert),
            4 => Some(ProgramType::Script),
            _ => None,
        }
    }

    /// Module type of this program's main module.
    pub fn main_module(self) -> ModuleType {
        match self {
            ProgramType::Indicator => ModuleType::Indicator,
            ProgramType::Expert => ModuleType::Expert,
            ProgramType::Script => ModuleType::Script,
        }
    }
}

/// Kind of a single module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum ModuleType {
    Indicator = 1,
    Expert = 2,
    Script = 4,
    Library = 8,
}

impl ModuleType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ModuleType::Indicator),
            2 => Some(ModuleType::Expert),
            4 => Some(ModuleType::Script),
            8 => Some(ModuleType::Library),
            _ => None,
        }
    }
}

/// How a program was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum LaunchType {
    Template = 1,
    Program = 2,
    Manual = 3,
}

impl LaunchType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(LaunchType::Template),
            2 => Some(LaunchType::Program),
            3 => Some(LaunchType::Manual),
            _ => None,
        }
    }
}

/// Root function currently executing in a module.
///
/// Advances `Uninitialized -> InInit -> InMainLoop -> InDeinit -> Uninitialized`; a module
/// that is unloaded for good stays at `InDeinit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[repr(u32)]
pub enum Phase {
    #[default]
    Uninitialized = 0,
    InInit = 1,
    InMainLoop = 2,
    InDeinit = 3,
}

impl Phase {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Phase::Uninitialized),
            1 => Some(Phase::InInit),
            2 => Some(Phase::InMainLoop),
            3 => Some(Phase::InDeinit),
            _ => None,
        }
    }

    /// True while no root function is active, i.e. between two init cycles.
    pub fn is_idle(self) -> bool {
        self == Phase::Uninitialized
    }
}

/// Why a module's init function is running.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[repr(u32)]
pub enum InitializeReason {
    User = 1,
    Template = 2,
    Program = 3,
    ProgramAfterTest = 4,
    Parameters = 5,
    TimeframeChange = 6,
    SymbolChange = 7,
    Recompile = 8,
}

impl InitializeReason {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(InitializeReason::User),
            2 => Some(InitializeReason::Template),
            3 => Some(InitializeReason::Program),
            4 => Some(InitializeReason::ProgramAfterTest),
            5 => Some(InitializeReason::Parameters),
            6 => Some(InitializeReason::TimeframeChange),
            7 => Some(InitializeReason::SymbolChange),
            8 => Some(InitializeReason::Recompile),
            _ => None,
        }
    }

    /// The program survives this init: same identity, new module memory.
    pub fn is_init_cycle(self) -> bool {
        matches!(
            self,
            InitializeReason::Parameters
                | InitializeReason::TimeframeChange
                | InitializeReason::SymbolChange
        )
    }
}

/// Reason the host reported for the preceding deinit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[repr(u32)]
pub enum UninitializeReason {
    #[default]
    Undefined = 0,
    Remove = 1,
    Recompile = 2,
    ChartChange = 3,
    ChartClose = 4,
    Parameters = 5,
    Account = 6,
    Template = 7,
    InitFailed = 8,
    Close = 9,
}

impl UninitializeReason {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(UninitializeReason::Undefined),
            1 => Some(UninitializeReason::Remove),
            2 => Some(UninitializeReason::Recompile),
            3 => Some(UninitializeReason::ChartChange),
            4 => Some(UninitializeReason::ChartClose),
            5 => Some(UninitializeReason::Parameters),
            6 => Some(UninitializeReason::Account),
            7 => Some(UninitializeReason::Template),
            8 => Some(UninitializeReason::InitFailed),
            9 => Some(UninitializeReason::Close),
            _ => None,
        }
    }

    /// Deinit reasons after which an expert keeps its module memory.
    pub fn keeps_expert_alive(self) -> bool {
        matches!(
            self,
            UninitializeReason::Parameters | UninitializeReason::ChartChange
        )
    }
}

/// Chart period in minutes; always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe(u32);

impl Timeframe {
    pub const M1: Timeframe = Timeframe(1);
    pub const M5: Timeframe = Timeframe(5);
    pub const M15: Timeframe = Timeframe(15);
    pub const M30: Timeframe = Timeframe(30);
    pub const H1: Timeframe = Timeframe(60);
    pub const H4: Timeframe = Timeframe(240);
    pub const D1: Timeframe = Timeframe(1440);
    pub const W1: Timeframe = Timeframe(10080);
    pub const MN1: Timeframe = Timeframe(43200);

    /// Validates a host-supplied period.
    pub fn new(minutes: i32) -> Result<Self, SyncError> {
        if minutes <= 0 {
            return Err(SyncError::InvalidArgument(format!(
                "invalid timeframe: {} (must be positive)",
                minutes
            )));
        }
        Ok(Timeframe(minutes as u32))
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    /// Period label as shown in chart window titles.
    pub fn description(self) -> String {
        match self.0 {
            1 => "M1".to_string(),
            5 => "M5".to_string(),
            15 => "M15".to_string(),
            30 => "M30".to_string(),
            60 => "H1".to_string(),
            240 => "H4".to_string(),
            1440 => "Daily".to_string(),
            10080 => "Weekly".to_string(),
            43200 => "Monthly".to_string(),
            n => format!("M{}", n),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

bitflags! {
    /// Init-time behaviour requested by a program.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InitFlags: u32 {
        const TIMEZONE = 0x0001;
        const PIP_VALUE = 0x0002;
        const BARS_ON_HIST_UPDATE = 0x0004;
        const CUSTOM_LOG = 0x0008;
        const NO_BARS_REQUIRED = 0x0010;
    }
}

bitflags! {
    /// Deinit-time behaviour requested by a program.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DeinitFlags: u32 {
        const TIMEZONE = 0x0001;
        const FLUSH_LOG = 0x0002;
    }
}
