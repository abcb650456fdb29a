//! Library-module transitions: attachment to the owning program and reattachment.

use super::{require_non_empty, require_pid, ContextSync};
use crate::context::SharedContext;
use crate::error::SyncError;
use crate::types::{ModuleType, Phase, ProgramId, Timeframe, UninitializeReason};
use tracing::{debug, info, instrument};

/// Host-reported state at a library module's init.
#[derive(Debug, Clone, Copy)]
pub struct LibraryInit<'a> {
    pub module_name: &'a str,
    pub uninit_reason: UninitializeReason,
    pub symbol: &'a str,
    /// Timeframe in minutes
    pub timeframe: i32,
}

impl ContextSync {
    /// Synchronize `lib` at the init of a library module.
    ///
    /// A fresh library joins the program its thread executed last. A library that already
    /// belongs to a program only updates its mutable fields, except under the tester, where
    /// an off-UI-thread init marks it and its program as mid-cycle so the next expert init
    /// can reattach it.
    #[instrument(level = "debug", skip_all, fields(module = args.module_name))]
    pub fn init_library(
        &self,
        lib: &SharedContext,
        args: &LibraryInit<'_>,
    ) -> Result<ProgramId, SyncError> {
        require_non_empty(args.module_name, "module name")?;
        require_non_empty(args.symbol, "symbol")?;
        let timeframe = Timeframe::new(args.timeframe)?;
        let thread = self.host.current_thread();

        let (existing, testing) = {
            let l = lib.read();
            if l.is_main() {
                return Err(SyncError::InvalidArgument(
                    "main module context passed as a library".to_string(),
                ));
            }
            (l.pid, l.test.testing)
        };

        match existing {
            None => {
                let pid = self.registry.threads().last_program(thread).ok_or_else(|| {
                    SyncError::IllegalState(format!(
                        "library {} loaded on thread {} before any program",
                        args.module_name, thread
                    ))
                })?;
                let chain = self.registry.chain_or_error(pid)?;
                let mut attached = self.registry.master(pid)?.read().clone();
                attached.module_type = Some(ModuleType::Library);
                attached.module_name = args.module_name.to_string();
                attached.previous_pid = None;
                attached.phase = Phase::InInit;
                attached.uninit_reason = args.uninit_reason;
                attached.symbol = args.symbol.to_string();
                attached.timeframe = Some(timeframe);
                attached.thread_id = thread;
                attached.ticks = 0;
                attached.last_tick_at = None;
                attached.mql_error = 0;
                attached.dll_error = 0;
                *lib.write() = attached;

                let guard = self.registry.lock_structure();
                chain.write().push_library(lib.clone());
                drop(guard);
                info!(pid = %pid, module = args.module_name, "Library attached");
                Ok(pid)
            }
            Some(pid) if testing && !self.host.is_ui_thread() => {
                {
                    let mut l = lib.write();
                    l.phase = Phase::Uninitialized;
                    l.uninit_reason = args.uninit_reason;
                    l.thread_id = thread;
                }
                self.registry.master(pid)?.write().phase = Phase::Uninitialized;
                debug!(pid = %pid, "Tester library marked mid-cycle");
                Ok(pid)
            }
            Some(pid) => {
                let mut l = lib.write();
                l.phase = Phase::InInit;
                l.uninit_reason = args.uninit_reason;
                l.symbol = args.symbol.to_string();
                l.timeframe = Some(timeframe);
                l.thread_id = thread;
                debug!(pid = %pid, "Library re-initialized");
                Ok(pid)
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(uninit_reason = %uninit_reason))]
    pub fn deinit_library(
        &self,
        lib: &SharedContext,
        uninit_reason: UninitializeReason,
    ) -> Result<ProgramId, SyncError> {
        let pid = require_pid(lib, "library deinit")?;
        let mut l = lib.write();
        l.phase = Phase::InDeinit;
        l.uninit_reason = uninit_reason;
        l.thread_id = self.host.current_thread();
        Ok(pid)
    }
}
