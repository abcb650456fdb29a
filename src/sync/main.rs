//! Main-module transitions: init, start, deinit.

use super::{require_non_empty, require_pid, ContextSync};
use crate::chart::{ChartBinding, ChartLocator, ChartRequest};
use crate::context::{ExecutionContext, SharedContext, TestFlags};
use crate::error::SyncError;
use crate::limbo::{LimboQuery, LimboScanner};
use crate::resolver::{InitReasonResolver, InitSignals, PriorInstance};
use crate::types::{
    DeinitFlags, Hwnd, InitFlags, InitializeReason, LaunchType, ModuleType, Phase, ProgramId,
    ProgramType, ThreadId, Timeframe, UninitializeReason,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

/// Host-reported state at a main module's init.
#[derive(Debug, Clone, Copy)]
pub struct MainInit<'a> {
    pub program_type: ProgramType,
    pub program_name: &'a str,
    /// Reason of the preceding deinit as reported by the host
    pub uninit_reason: UninitializeReason,
    pub init_flags: InitFlags,
    pub deinit_flags: DeinitFlags,
    pub symbol: &'a str,
    /// Timeframe in minutes
    pub timeframe: i32,
    /// Chart handle supplied by the host, `Hwnd::NONE` if unknown
    pub chart: Hwnd,
    pub test: TestFlags,
    /// Context of the program that started this one programmatically
    pub super_context: Option<&'a SharedContext>,
}

/// Outcome of identity resolution in `init_main`.
struct Identity {
    pid: ProgramId,
    reason: InitializeReason,
    chart: Hwnd,
    chart_window: Hwnd,
    first: bool,
}

impl ContextSync {
    /// Synchronize `ctx` at the init of a program's main module.
    ///
    /// Returns the program id, which stays the same for every later call on this program.
    #[instrument(
        level = "debug",
        skip_all,
        fields(program = args.program_name, uninit_reason = %args.uninit_reason)
    )]
    pub fn init_main(
        &self,
        ctx: &SharedContext,
        args: &MainInit<'_>,
    ) -> Result<ProgramId, SyncError> {
        require_non_empty(args.program_name, "program name")?;
        require_non_empty(args.symbol, "symbol")?;
        let timeframe = Timeframe::new(args.timeframe)?;
        if args.chart == Hwnd::INVALID {
            return Err(SyncError::InvalidArgument("invalid chart handle".to_string()));
        }

        let sec = match args.super_context {
            Some(sec) if Arc::ptr_eq(sec, ctx) => {
                return Err(SyncError::InvalidArgument(
                    "a program cannot be its own super context".to_string(),
                ));
            }
            Some(sec) => {
                let snapshot = sec.read().clone();
                if snapshot.pid.is_none() {
                    return Err(SyncError::InvalidArgument(
                        "super context has no program id".to_string(),
                    ));
                }
                Some(snapshot)
            }
            None => None,
        };
        let test = sec.as_ref().map_or(args.test, |s| s.test);

        let existing = {
            let c = ctx.read();
            if !matches!(c.phase, Phase::Uninitialized | Phase::InDeinit) {
                return Err(SyncError::IllegalState(format!(
                    "init in phase {}",
                    c.phase
                )));
            }
            c.pid
        };

        let thread = self.host.current_thread();
        let identity = match existing {
            Some(pid) => self.continue_cycle(ctx, pid, args, sec.as_ref(), test, timeframe)?,
            None => self.identify(ctx, args, sec.as_ref(), test, timeframe, thread)?,
        };
        let pid = identity.pid;

        {
            let mut c = ctx.write();
            if identity.first {
                c.program_type = Some(args.program_type);
                c.program_name = args.program_name.to_string();
                c.module_type = Some(args.program_type.main_module());
                c.module_name = args.program_name.to_string();
                c.launch_type = Some(launch_type(sec.is_some(), identity.reason));
                c.super_pid = sec.as_ref().and_then(|s| s.pid);
                c.init_flags = args.init_flags;
                c.deinit_flags = args.deinit_flags;
                c.test = test;
                c.logging = sec
                    .as_ref()
                    .map_or_else(|| self.program_logging.clone(), |s| s.logging.clone());
            }
            c.pid = Some(pid);
            c.phase = Phase::InInit;
            c.init_reason = Some(identity.reason);
            c.uninit_reason = args.uninit_reason;
            c.symbol = args.symbol.to_string();
            c.timeframe = Some(timeframe);
            c.chart = identity.chart;
            c.chart_window = identity.chart_window;
            c.thread_id = thread;
        }
        self.refresh_master(pid, ctx)?;

        if identity.first && args.program_type == ProgramType::Expert && test.testing {
            self.reattach_tester_libraries(ctx, pid, thread)?;
        }
        self.registry.record_thread(thread, pid);

        if identity.first {
            info!(pid = %pid, init_reason = %identity.reason, thread = %thread, "Program registered");
        } else {
            debug!(pid = %pid, init_reason = %identity.reason, "Program re-initialized");
        }
        Ok(pid)
    }

    /// Mark the start of the main loop; counts a tick.
    #[instrument(level = "debug", skip_all)]
    pub fn start_main(&self, ctx: &SharedContext) -> Result<ProgramId, SyncError> {
        let pid = require_pid(ctx, "start")?;
        let thread = self.host.current_thread();
        let now = self.host.now();
        {
            let mut c = ctx.write();
            if !matches!(c.phase, Phase::InInit | Phase::InMainLoop) {
                return Err(SyncError::IllegalState(format!(
                    "start in phase {}",
                    c.phase
                )));
            }
            c.phase = Phase::InMainLoop;
            c.ticks = c.ticks.saturating_add(1);
            c.last_tick_at = Some(now);
            c.thread_id = thread;
        }
        self.refresh_master(pid, ctx)?;
        self.registry.record_thread(thread, pid);
        trace!(pid = %pid, "Tick");
        Ok(pid)
    }

    /// Synchronize `ctx` at the deinit of a program's main module.
    ///
    /// The main slot is released unless the host keeps the module alive for the next cycle.
    #[instrument(level = "debug", skip_all, fields(uninit_reason = %uninit_reason))]
    pub fn deinit_main(
        &self,
        ctx: &SharedContext,
        uninit_reason: UninitializeReason,
    ) -> Result<ProgramId, SyncError> {
        let pid = require_pid(ctx, "deinit")?;
        let thread = self.host.current_thread();
        let module_type = {
            let mut c = ctx.write();
            if !matches!(c.phase, Phase::InInit | Phase::InMainLoop) {
                return Err(SyncError::IllegalState(format!(
                    "deinit in phase {}",
                    c.phase
                )));
            }
            let module_type = match c.module_type {
                Some(t) if t != ModuleType::Library => t,
                _ => {
                    return Err(SyncError::InvalidArgument(
                        "not a main module context".to_string(),
                    ))
                }
            };
            c.phase = Phase::InDeinit;
            c.uninit_reason = uninit_reason;
            c.thread_id = thread;
            module_type
        };
        self.refresh_master(pid, ctx)?;

        let release = match module_type {
            ModuleType::Expert => !uninit_reason.keeps_expert_alive(),
            _ => true,
        };
        if release {
            let chain = self.registry.chain_or_error(pid)?;
            let mut chain = chain.write();
            if chain.main().is_some_and(|main| Arc::ptr_eq(main, ctx)) {
                chain.release_main();
            }
            chain.master().write().phase = Phase::Uninitialized;
            debug!(pid = %pid, "Main context released, program in limbo");
        }
        self.registry.record_thread(thread, pid);
        Ok(pid)
    }

    /// A context that already carries an id: an expert whose module survived the cycle.
    fn continue_cycle(
        &self,
        ctx: &SharedContext,
        pid: ProgramId,
        args: &MainInit<'_>,
        sec: Option<&ExecutionContext>,
        test: TestFlags,
        timeframe: Timeframe,
    ) -> Result<Identity, SyncError> {
        let (prior_symbol, prior_ticks, chart, chart_window) = {
            let c = ctx.read();
            (c.symbol.clone(), c.ticks, c.chart, c.chart_window)
        };
        let prior = PriorInstance {
            ticks: prior_ticks,
            symbol: &prior_symbol,
        };
        let reason = InitReasonResolver::new(&self.compat, self.host.as_ref())
            .resolve(&signals(args, sec, test, Some(prior)))?;

        let (chart, chart_window) = if args.chart.is_set() {
            let binding = self.locate_chart(args, sec, test, timeframe)?;
            (binding.chart(), binding.chart_window())
        } else {
            (chart, chart_window)
        };

        let chain = self.registry.chain_or_error(pid)?;
        let mut chain = chain.write();
        match chain.main() {
            None => chain.restore_main(ctx.clone()),
            Some(main) if Arc::ptr_eq(main, ctx) => {}
            Some(_) => {
                return Err(SyncError::IllegalState(format!(
                    "program {} already has another main context",
                    pid
                )))
            }
        }
        Ok(Identity {
            pid,
            reason,
            chart,
            chart_window,
            first: false,
        })
    }

    /// A fresh context: recover an indicator from limbo or register a new program.
    fn identify(
        &self,
        ctx: &SharedContext,
        args: &MainInit<'_>,
        sec: Option<&ExecutionContext>,
        test: TestFlags,
        timeframe: Timeframe,
        thread: ThreadId,
    ) -> Result<Identity, SyncError> {
        let binding = self.locate_chart(args, sec, test, timeframe)?;

        let limbo = if args.program_type == ProgramType::Indicator {
            LimboScanner::new(&self.registry, self.host.ui_thread()).find(&LimboQuery {
                chart: binding.chart(),
                program_name: args.program_name,
                uninit_reason: args.uninit_reason,
            })?
        } else {
            None
        };
        let limbo_master = match limbo {
            Some(pid) => Some((pid, self.registry.master(pid)?.read().clone())),
            None => None,
        };
        let prior = limbo_master.as_ref().map(|(_, master)| PriorInstance {
            ticks: master.ticks,
            symbol: &master.symbol,
        });
        let reason = InitReasonResolver::new(&self.compat, self.host.as_ref())
            .resolve(&signals(args, sec, test, prior))?;

        let (pid, first) = match limbo_master {
            Some((pid, _)) if reason.is_init_cycle() => {
                self.leave_limbo(ctx, pid)?;
                (pid, false)
            }
            _ => (self.create_program(ctx, thread)?, true),
        };
        Ok(Identity {
            pid,
            reason,
            chart: binding.chart(),
            chart_window: binding.chart_window(),
            first,
        })
    }

    /// Restore `ctx` from the master of program `pid` and make it the main context again.
    fn leave_limbo(&self, ctx: &SharedContext, pid: ProgramId) -> Result<(), SyncError> {
        let chain = self.registry.chain_or_error(pid)?;
        let mut chain = chain.write();
        if !chain.is_in_limbo() {
            return Err(SyncError::IllegalState(format!(
                "program {} left limbo concurrently",
                pid
            )));
        }
        let master = chain.master().read().clone();
        *ctx.write() = master;
        chain.restore_main(ctx.clone());
        debug!(pid = %pid, "Main context restored from limbo");
        Ok(())
    }

    fn create_program(&self, ctx: &SharedContext, thread: ThreadId) -> Result<ProgramId, SyncError> {
        let master = ExecutionContext::new().into_shared();
        let guard = self.registry.lock_structure();
        self.registry
            .create_chain(&guard, master, ctx.clone(), thread, self.host.now())
    }

    fn locate_chart(
        &self,
        args: &MainInit<'_>,
        sec: Option<&ExecutionContext>,
        test: TestFlags,
        timeframe: Timeframe,
    ) -> Result<ChartBinding, SyncError> {
        ChartLocator::new(self.host.as_ref()).locate(&ChartRequest {
            explicit: args.chart,
            super_context: sec,
            module_type: args.program_type.main_module(),
            test,
            symbol: args.symbol,
            timeframe,
        })
    }

    /// The tester reuses library module memory across sequential test runs while the expert
    /// itself is reloaded. Libraries left mid-cycle by the previous run on this thread move to
    /// the new program.
    fn reattach_tester_libraries(
        &self,
        ctx: &SharedContext,
        pid: ProgramId,
        thread: ThreadId,
    ) -> Result<(), SyncError> {
        let Some(prior) = self.registry.threads().last_program(thread) else {
            return Ok(());
        };
        if prior == pid {
            return Ok(());
        }
        let prior_chain = self.registry.chain_or_error(prior)?;
        if !prior_chain.read().master().read().phase.is_idle() {
            return Ok(());
        }

        let template = ctx.read().clone();
        let guard = self.registry.lock_structure();
        let libraries = {
            let mut prior_chain = prior_chain.write();
            // The prior program may have re-entered init since the unlocked check.
            if !prior_chain.is_in_limbo() || !prior_chain.master().read().phase.is_idle() {
                return Ok(());
            }
            prior_chain.take_idle_libraries()
        };
        if libraries.is_empty() {
            return Ok(());
        }
        for lib in &libraries {
            let mut l = lib.write();
            l.previous_pid = l.pid;
            l.pid = Some(pid);
            l.program_type = template.program_type;
            l.program_name = template.program_name.clone();
            l.launch_type = template.launch_type;
            l.super_pid = template.super_pid;
            l.init_reason = template.init_reason;
            l.test = template.test;
            l.symbol = template.symbol.clone();
            l.timeframe = template.timeframe;
            l.chart = template.chart;
            l.chart_window = template.chart_window;
            l.phase = Phase::InInit;
        }
        let count = libraries.len();
        let mut chain = self.registry.chain_or_error(pid)?.write();
        for lib in libraries {
            chain.push_library(lib);
        }
        drop(chain);
        drop(guard);

        info!(from = %prior, to = %pid, count, "Reattached tester libraries");
        Ok(())
    }
}

fn signals<'a>(
    args: &MainInit<'a>,
    sec: Option<&ExecutionContext>,
    test: TestFlags,
    prior: Option<PriorInstance<'a>>,
) -> InitSignals<'a> {
    InitSignals {
        program_type: args.program_type,
        program_name: args.program_name,
        uninit_reason: args.uninit_reason,
        super_test: sec.map(|s| s.test),
        test,
        prior,
        symbol: args.symbol,
    }
}

fn launch_type(has_super: bool, reason: InitializeReason) -> LaunchType {
    if has_super {
        LaunchType::Program
    } else if reason == InitializeReason::Template {
        LaunchType::Template
    } else {
        LaunchType::Manual
    }
}
