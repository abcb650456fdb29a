//! Host-facing API
//!
//! The boundary the host and its modules call into. Raw codes and handles are validated
//! here, failures never cross as `Result`: operations return an error code, accessors return
//! a sentinel, and the failure is logged and stored in the context's `dll_error` field.

use crate::config::RegistryConfig;
use crate::context::{wire, ExecutionContext, SharedContext, TestFlags};
use crate::error::{codes, SyncError};
use crate::registry::ContextRegistry;
use crate::sync::{ContextSync, LibraryInit, MainInit};
use crate::types::{
    DeinitFlags, Hwnd, InitFlags, ProgramId, ProgramType, Timeframe, UninitializeReason,
};
use std::path::PathBuf;
use tracing::{error, warn};

/// Raw arguments of a main module's init call.
#[derive(Debug, Clone, Copy)]
pub struct RawMainInit<'a> {
    pub program_type: u32,
    pub program_name: &'a str,
    pub uninit_reason: u32,
    pub init_flags: u32,
    pub deinit_flags: u32,
    pub symbol: &'a str,
    pub timeframe: i32,
    /// Chart handle, 0 if the host has none yet
    pub chart: u32,
    pub testing: bool,
    pub visual_mode: bool,
    pub optimization: bool,
    pub super_context: Option<&'a SharedContext>,
}

/// Raw arguments of a library module's init call.
#[derive(Debug, Clone, Copy)]
pub struct RawLibInit<'a> {
    pub module_name: &'a str,
    pub uninit_reason: u32,
    pub symbol: &'a str,
    pub timeframe: i32,
}

#[derive(Debug, Clone, Copy)]
pub enum MainTransition<'a> {
    Init(RawMainInit<'a>),
    Start,
    Deinit { uninit_reason: u32 },
}

#[derive(Debug, Clone, Copy)]
pub enum LibTransition<'a> {
    Init(RawLibInit<'a>),
    Deinit { uninit_reason: u32 },
}

/// Context API service
pub struct ContextApi {
    sync: ContextSync,
    min_valid_handle: u32,
}

impl ContextApi {
    pub fn new(sync: ContextSync, config: &RegistryConfig) -> Self {
        Self {
            sync,
            min_valid_handle: config.min_valid_handle,
        }
    }

    pub fn sync(&self) -> &ContextSync {
        &self.sync
    }

    pub fn registry(&self) -> &ContextRegistry {
        self.sync.registry()
    }

    /// Main module transition. Returns `NO_ERROR` or the error code of the failure.
    pub fn sync_main_context(
        &self,
        ctx: Option<&SharedContext>,
        transition: MainTransition<'_>,
    ) -> i32 {
        let result = required(ctx).and_then(|c| match transition {
            MainTransition::Init(raw) => {
                let args = self.main_init(&raw)?;
                self.sync.init_main(c, &args)
            }
            MainTransition::Start => self.sync.start_main(c),
            MainTransition::Deinit { uninit_reason } => {
                self.sync.deinit_main(c, uninit_reason_from(uninit_reason)?)
            }
        });
        status(ctx, "sync_main_context", result)
    }

    /// Library module transition. Returns `NO_ERROR` or the error code of the failure.
    pub fn sync_lib_context(&self, ctx: Option<&SharedContext>, transition: LibTransition<'_>) -> i32 {
        let result = required(ctx).and_then(|c| match transition {
            LibTransition::Init(raw) => self.sync.init_library(
                c,
                &LibraryInit {
                    module_name: raw.module_name,
                    uninit_reason: uninit_reason_from(raw.uninit_reason)?,
                    symbol: raw.symbol,
                    timeframe: raw.timeframe,
                },
            ),
            LibTransition::Deinit { uninit_reason } => {
                self.sync.deinit_library(c, uninit_reason_from(uninit_reason)?)
            }
        });
        status(ctx, "sync_lib_context", result)
    }

    /// Set the last error of a context, propagating it to the owning and super programs.
    pub fn set_mql_error(&self, ctx: Option<&SharedContext>, code: i32) -> bool {
        let result = required(ctx).and_then(|c| self.registry().set_mql_error(c, code));
        report(ctx, "set_mql_error", result).is_some()
    }

    /// Main context of the program that started this one, `None` if there is none or it is
    /// in limbo.
    pub fn super_context(&self, ctx: Option<&SharedContext>) -> Option<SharedContext> {
        let result = required(ctx).and_then(|c| self.registry().super_context(c));
        report(ctx, "super_context", result).flatten()
    }

    /// Set the chart handle of a context; `Hwnd::NONE` detaches it.
    pub fn set_chart(&self, ctx: Option<&SharedContext>, raw: u32) -> bool {
        let result = required(ctx).and_then(|c| {
            let chart = self.handle(raw)?;
            c.write().chart = chart;
            Ok(())
        });
        report(ctx, "set_chart", result).is_some()
    }

    /// Set the frame window of a context; `Hwnd::NONE` detaches it.
    pub fn set_chart_window(&self, ctx: Option<&SharedContext>, raw: u32) -> bool {
        let result = required(ctx).and_then(|c| {
            let window = self.handle(raw)?;
            c.write().chart_window = window;
            Ok(())
        });
        report(ctx, "set_chart_window", result).is_some()
    }

    fn main_init<'a>(&self, raw: &RawMainInit<'a>) -> Result<MainInit<'a>, SyncError> {
        Ok(MainInit {
            program_type: ProgramType::from_code(raw.program_type).ok_or_else(|| {
                SyncError::InvalidArgument(format!("program type {}", raw.program_type))
            })?,
            program_name: raw.program_name,
            uninit_reason: uninit_reason_from(raw.uninit_reason)?,
            init_flags: InitFlags::from_bits(raw.init_flags).ok_or_else(|| {
                SyncError::InvalidArgument(format!("init flags {:#x}", raw.init_flags))
            })?,
            deinit_flags: DeinitFlags::from_bits(raw.deinit_flags).ok_or_else(|| {
                SyncError::InvalidArgument(format!("deinit flags {:#x}", raw.deinit_flags))
            })?,
            symbol: raw.symbol,
            timeframe: raw.timeframe,
            chart: self.handle(raw.chart)?,
            test: TestFlags {
                testing: raw.testing,
                visual_mode: raw.visual_mode,
                optimization: raw.optimization,
            },
            super_context: raw.super_context,
        })
    }

    /// Raw handles below the lowest valid address are garbage, not handles.
    fn handle(&self, raw: u32) -> Result<Hwnd, SyncError> {
        if raw == 0 {
            return Ok(Hwnd::NONE);
        }
        if raw < self.min_valid_handle || raw == Hwnd::INVALID.0 {
            return Err(SyncError::InvalidArgument(format!(
                "invalid window handle {:#x}",
                raw
            )));
        }
        Ok(Hwnd(raw))
    }
}

fn required(ctx: Option<&SharedContext>) -> Result<&SharedContext, SyncError> {
    ctx.ok_or_else(|| SyncError::InvalidArgument("null context".to_string()))
}

fn uninit_reason_from(code: u32) -> Result<UninitializeReason, SyncError> {
    UninitializeReason::from_code(code)
        .ok_or_else(|| SyncError::InvalidArgument(format!("uninit reason {}", code)))
}

/// Log a failure and store its code in the context.
fn record_failure(ctx: Option<&SharedContext>, operation: &str, e: &SyncError) {
    if e.is_anomaly() {
        warn!(operation, error = %e, "Host call failed");
    } else {
        error!(operation, error = %e, "Host call failed");
    }
    if let Some(ctx) = ctx {
        ctx.write().dll_error = e.code();
    }
}

fn report<T>(ctx: Option<&SharedContext>, operation: &str, result: Result<T, SyncError>) -> Option<T> {
    result
        .map_err(|e| record_failure(ctx, operation, &e))
        .ok()
}

fn status<T>(ctx: Option<&SharedContext>, operation: &str, result: Result<T, SyncError>) -> i32 {
    match result {
        Ok(_) => codes::NO_ERROR,
        Err(e) => {
            record_failure(ctx, operation, &e);
            e.code()
        }
    }
}

fn read_or<T>(ctx: Option<&SharedContext>, sentinel: T, f: impl FnOnce(&ExecutionContext) -> T) -> T {
    match ctx {
        Some(ctx) => f(&*ctx.read()),
        None => {
            warn!("Context accessor called with a null context");
            sentinel
        }
    }
}

fn write_with(ctx: Option<&SharedContext>, f: impl FnOnce(&mut ExecutionContext)) -> bool {
    match ctx {
        Some(ctx) => {
            f(&mut *ctx.write());
            true
        }
        None => {
            warn!("Context setter called with a null context");
            false
        }
    }
}

pub fn ec_pid(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| ProgramId::raw(c.pid))
}

pub fn ec_previous_pid(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| ProgramId::raw(c.previous_pid))
}

pub fn ec_super_pid(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| ProgramId::raw(c.super_pid))
}

pub fn ec_program_type(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.program_type.map_or(0, |t| t as u32))
}

pub fn ec_program_name(ctx: Option<&SharedContext>) -> String {
    read_or(ctx, String::new(), |c| c.program_name.clone())
}

pub fn ec_module_type(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.module_type.map_or(0, |t| t as u32))
}

pub fn ec_module_name(ctx: Option<&SharedContext>) -> String {
    read_or(ctx, String::new(), |c| c.module_name.clone())
}

pub fn ec_launch_type(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.launch_type.map_or(0, |t| t as u32))
}

pub fn ec_init_flags(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.init_flags.bits())
}

pub fn ec_deinit_flags(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.deinit_flags.bits())
}

pub fn ec_phase(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.phase as u32)
}

pub fn ec_init_reason(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.init_reason.map_or(0, |r| r as u32))
}

pub fn ec_uninit_reason(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.uninit_reason as u32)
}

pub fn ec_symbol(ctx: Option<&SharedContext>) -> String {
    read_or(ctx, String::new(), |c| c.symbol.clone())
}

pub fn ec_timeframe(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.timeframe.map_or(0, Timeframe::minutes))
}

pub fn ec_chart(ctx: Option<&SharedContext>) -> Hwnd {
    read_or(ctx, Hwnd::INVALID, |c| c.chart)
}

pub fn ec_chart_window(ctx: Option<&SharedContext>) -> Hwnd {
    read_or(ctx, Hwnd::INVALID, |c| c.chart_window)
}

pub fn ec_testing(ctx: Option<&SharedContext>) -> bool {
    read_or(ctx, false, |c| c.test.testing)
}

pub fn ec_visual_mode(ctx: Option<&SharedContext>) -> bool {
    read_or(ctx, false, |c| c.test.visual_mode)
}

pub fn ec_optimization(ctx: Option<&SharedContext>) -> bool {
    read_or(ctx, false, |c| c.test.optimization)
}

pub fn ec_thread_id(ctx: Option<&SharedContext>) -> u32 {
    read_or(ctx, 0, |c| c.thread_id.0)
}

pub fn ec_ticks(ctx: Option<&SharedContext>) -> u64 {
    read_or(ctx, 0, |c| c.ticks)
}

/// Unix timestamp of the last tick, `0` before the first one.
pub fn ec_last_tick_at(ctx: Option<&SharedContext>) -> i64 {
    read_or(ctx, 0, |c| c.last_tick_at.map_or(0, |t| t.timestamp()))
}

pub fn ec_mql_error(ctx: Option<&SharedContext>) -> i32 {
    read_or(ctx, 0, |c| c.mql_error)
}

pub fn ec_dll_error(ctx: Option<&SharedContext>) -> i32 {
    read_or(ctx, 0, |c| c.dll_error)
}

pub fn ec_log_enabled(ctx: Option<&SharedContext>) -> bool {
    read_or(ctx, false, |c| c.logging.enabled)
}

pub fn ec_log_level(ctx: Option<&SharedContext>) -> String {
    read_or(ctx, String::new(), |c| c.logging.level.clone())
}

pub fn ec_custom_log_file(ctx: Option<&SharedContext>) -> String {
    read_or(ctx, String::new(), |c| {
        c.logging
            .custom_log_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    })
}

pub fn ec_log_to_terminal(ctx: Option<&SharedContext>) -> bool {
    read_or(ctx, false, |c| c.logging.mirror_to_terminal)
}

/// Wire record of a context, `None` on failure.
pub fn ec_record(ctx: Option<&SharedContext>) -> Option<Vec<u8>> {
    let result = required(ctx).and_then(|c| {
        let snapshot = c.read().clone();
        wire::encode(&snapshot)
    });
    report(ctx, "ec_record", result)
}

pub fn ec_set_dll_error(ctx: Option<&SharedContext>, code: i32) -> bool {
    write_with(ctx, |c| c.dll_error = code)
}

pub fn ec_set_symbol(ctx: Option<&SharedContext>, symbol: &str) -> bool {
    if symbol.is_empty() {
        return report(ctx, "ec_set_symbol", Err::<(), _>(empty("symbol"))).is_some();
    }
    write_with(ctx, |c| c.symbol = symbol.to_string())
}

pub fn ec_set_timeframe(ctx: Option<&SharedContext>, minutes: i32) -> bool {
    match Timeframe::new(minutes) {
        Ok(tf) => write_with(ctx, |c| c.timeframe = Some(tf)),
        Err(e) => report(ctx, "ec_set_timeframe", Err::<(), _>(e)).is_some(),
    }
}

pub fn ec_set_log_enabled(ctx: Option<&SharedContext>, enabled: bool) -> bool {
    write_with(ctx, |c| c.logging.enabled = enabled)
}

pub fn ec_set_log_level(ctx: Option<&SharedContext>, level: &str) -> bool {
    if !crate::logging::LOG_LEVELS.contains(&level) {
        let e = SyncError::InvalidArgument(format!("log level '{}'", level));
        return report(ctx, "ec_set_log_level", Err::<(), _>(e)).is_some();
    }
    write_with(ctx, |c| c.logging.level = level.to_string())
}

pub fn ec_set_log_to_terminal(ctx: Option<&SharedContext>, mirror: bool) -> bool {
    write_with(ctx, |c| c.logging.mirror_to_terminal = mirror)
}

/// An empty path clears the custom log file.
pub fn ec_set_custom_log_file(ctx: Option<&SharedContext>, path: &str) -> bool {
    let file = (!path.is_empty()).then(|| PathBuf::from(path));
    write_with(ctx, |c| c.logging.custom_log_file = file)
}

fn empty(what: &str) -> SyncError {
    SyncError::InvalidArgument(format!("empty {}", what))
}
