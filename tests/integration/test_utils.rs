//! Shared test utilities for integration tests
//!
//! `FakeHost` is a scripted host: tests switch the calling thread, add chart surfaces, open
//! input dialogs and move the clock between synchronizer calls.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ctxsync::context::{ExecutionContext, SharedContext, TestFlags};
use ctxsync::error::HostError;
use ctxsync::host::{HostEnvironment, SurfaceInfo};
use ctxsync::sync::{ContextSync, LibraryInit, MainInit};
use ctxsync::types::{DeinitFlags, Hwnd, InitFlags, ProgramType, ThreadId, UninitializeReason};
use ctxsync::ContextRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

pub const UI_THREAD: ThreadId = ThreadId(1);
pub const TESTER_THREAD: ThreadId = ThreadId(5);

pub struct FakeHost {
    current: Mutex<ThreadId>,
    build: Mutex<u32>,
    surfaces: Mutex<Vec<SurfaceInfo>>,
    dialog_open: Mutex<bool>,
    enumeration_fails: Mutex<bool>,
    clock: Mutex<DateTime<Utc>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Self::with_build(1420)
    }

    pub fn with_build(build: u32) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(UI_THREAD),
            build: Mutex::new(build),
            surfaces: Mutex::new(Vec::new()),
            dialog_open: Mutex::new(false),
            enumeration_fails: Mutex::new(false),
            clock: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
        })
    }

    pub fn switch_to(&self, thread: ThreadId) {
        *self.current.lock() = thread;
    }

    /// Add a chart surface whose frame window is `chart + 1`.
    pub fn add_surface(&self, chart: u32, title: &str) {
        let mut surfaces = self.surfaces.lock();
        let seq = surfaces.len() as u64 + 1;
        surfaces.push(SurfaceInfo {
            chart: Hwnd(chart),
            chart_window: Hwnd(chart + 1),
            title: title.to_string(),
            order: chart,
            created_seq: seq,
        });
    }

    pub fn set_dialog_open(&self, open: bool) {
        *self.dialog_open.lock() = open;
    }

    /// Make every window enumeration fail until reset.
    pub fn fail_enumeration(&self, fail: bool) {
        *self.enumeration_fails.lock() = fail;
    }

    pub fn advance(&self, seconds: i64) {
        *self.clock.lock() += Duration::seconds(seconds);
    }
}

impl HostEnvironment for FakeHost {
    fn current_thread(&self) -> ThreadId {
        *self.current.lock()
    }

    fn ui_thread(&self) -> ThreadId {
        UI_THREAD
    }

    fn build(&self) -> u32 {
        *self.build.lock()
    }

    fn now(&self) -> DateTime<Utc> {
        *self.clock.lock()
    }

    fn chart_surfaces(&self) -> Result<Vec<SurfaceInfo>, HostError> {
        if *self.enumeration_fails.lock() {
            return Err(HostError::Enumeration("window list unavailable".to_string()));
        }
        Ok(self.surfaces.lock().clone())
    }

    fn input_dialog_open(&self, _: ProgramType, _: &str) -> Result<bool, HostError> {
        Ok(*self.dialog_open.lock())
    }
}

/// Fresh registry and synchronizer driven by `host`.
pub fn sync_with(host: &Arc<FakeHost>) -> ContextSync {
    ContextSync::new(Arc::new(ContextRegistry::new()), host.clone())
}

pub fn fresh() -> SharedContext {
    ExecutionContext::new().into_shared()
}

pub fn indicator<'a>(name: &'a str, chart: u32, reason: UninitializeReason) -> MainInit<'a> {
    MainInit {
        program_type: ProgramType::Indicator,
        program_name: name,
        uninit_reason: reason,
        init_flags: InitFlags::empty(),
        deinit_flags: DeinitFlags::empty(),
        symbol: "EURUSD",
        timeframe: 60,
        chart: Hwnd(chart),
        test: TestFlags::default(),
        super_context: None,
    }
}

pub fn expert<'a>(name: &'a str, reason: UninitializeReason, test: TestFlags) -> MainInit<'a> {
    MainInit {
        program_type: ProgramType::Expert,
        program_name: name,
        uninit_reason: reason,
        init_flags: InitFlags::empty(),
        deinit_flags: DeinitFlags::empty(),
        symbol: "EURUSD",
        timeframe: 60,
        chart: Hwnd::NONE,
        test,
        super_context: None,
    }
}

pub fn library(name: &str) -> LibraryInit<'_> {
    LibraryInit {
        module_name: name,
        uninit_reason: UninitializeReason::Undefined,
        symbol: "EURUSD",
        timeframe: 60,
    }
}

pub fn tester() -> TestFlags {
    TestFlags {
        testing: true,
        visual_mode: false,
        optimization: false,
    }
}
