//! Integration tests for main-module init, start and deinit

use crate::integration::test_utils::{expert, fresh, indicator, sync_with, tester, FakeHost};
use ctxsync::context::ExecutionContext;
use ctxsync::error::SyncError;
use ctxsync::host::HostEnvironment;
use ctxsync::types::{
    Hwnd, InitializeReason, LaunchType, ModuleType, Phase, ProgramType, Timeframe,
    UninitializeReason,
};

#[test]
fn test_indicator_limbo_round_trip() {
    let host = FakeHost::new();
    host.add_surface(100, "EURUSD,H1");
    let sync = sync_with(&host);

    let first = fresh();
    let pid = sync
        .init_main(&first, &indicator("Foo", 100, UninitializeReason::Undefined))
        .unwrap();
    assert_eq!(pid.get(), 1);
    let master = sync.registry().master(pid).unwrap();
    assert_eq!(*master.read(), *first.read());

    sync.start_main(&first).unwrap();
    sync.deinit_main(&first, UninitializeReason::Parameters)
        .unwrap();

    let chain = sync.registry().chain(pid).unwrap();
    assert!(chain.read().is_in_limbo());
    assert_eq!(master.read().pid, Some(pid));
    assert_eq!(master.read().symbol, "EURUSD");
    assert_eq!(master.read().phase, Phase::Uninitialized);
    let before = master.read().clone();

    let second = fresh();
    let again = sync
        .init_main(&second, &indicator("Foo", 100, UninitializeReason::Parameters))
        .unwrap();
    assert_eq!(again, pid);
    assert!(!chain.read().is_in_limbo());
    assert_eq!(sync.registry().chain_count(), 1);

    let expected = ExecutionContext {
        phase: Phase::InInit,
        init_reason: Some(InitializeReason::Parameters),
        ..before
    };
    assert_eq!(*second.read(), expected);
    assert_eq!(*master.read(), expected);
}

#[test]
fn test_parameter_change_before_first_tick_leaves_limbo() {
    let host = FakeHost::new();
    host.add_surface(100, "EURUSD,H1");
    let sync = sync_with(&host);

    let first = fresh();
    let pid = sync
        .init_main(&first, &indicator("Foo", 100, UninitializeReason::Undefined))
        .unwrap();
    assert_eq!(pid.get(), 1);
    sync.deinit_main(&first, UninitializeReason::Parameters)
        .unwrap();
    let master = sync.registry().master(pid).unwrap();
    assert_eq!(master.read().ticks, 0);
    let before = master.read().clone();

    let second = fresh();
    let again = sync
        .init_main(&second, &indicator("Foo", 100, UninitializeReason::Parameters))
        .unwrap();
    assert_eq!(again, pid);
    assert_eq!(sync.registry().chain_count(), 1);
    assert!(!sync.registry().chain(pid).unwrap().read().is_in_limbo());

    let expected = ExecutionContext {
        phase: Phase::InInit,
        init_reason: Some(InitializeReason::Parameters),
        ..before
    };
    assert_eq!(*second.read(), expected);
}

#[test]
fn test_indicator_symbol_change_keeps_identity() {
    let host = FakeHost::new();
    host.add_surface(100, "EURUSD,H1");
    let sync = sync_with(&host);

    let first = fresh();
    let pid = sync
        .init_main(&first, &indicator("Foo", 100, UninitializeReason::Undefined))
        .unwrap();
    sync.start_main(&first).unwrap();
    sync.deinit_main(&first, UninitializeReason::ChartChange)
        .unwrap();

    let second = fresh();
    let args = ctxsync::sync::MainInit {
        symbol: "GBPUSD",
        ..indicator("Foo", 100, UninitializeReason::ChartChange)
    };
    assert_eq!(sync.init_main(&second, &args).unwrap(), pid);
    let ctx = second.read();
    assert_eq!(ctx.init_reason, Some(InitializeReason::SymbolChange));
    assert_eq!(ctx.symbol, "GBPUSD");
    assert_eq!(ctx.ticks, 1);
}

#[test]
fn test_new_indicator_without_limbo_gets_new_id() {
    let host = FakeHost::new();
    let sync = sync_with(&host);

    let a = fresh();
    let b = fresh();
    let pid_a = sync
        .init_main(&a, &indicator("Foo", 100, UninitializeReason::Undefined))
        .unwrap();
    // Parameter input of a freshly added indicator
    let pid_b = sync
        .init_main(&b, &indicator("Foo", 200, UninitializeReason::Parameters))
        .unwrap();
    assert_ne!(pid_a, pid_b);
    assert_eq!(b.read().init_reason, Some(InitializeReason::User));
    assert_eq!(b.read().launch_type, Some(LaunchType::Manual));
}

#[test]
fn test_identity_is_stable_across_transitions() {
    let host = FakeHost::new();
    host.add_surface(0x2000, "EURUSD,H1");
    let sync = sync_with(&host);
    let ctx = fresh();

    let pid = sync
        .init_main(&ctx, &expert("Grid", UninitializeReason::Undefined, Default::default()))
        .unwrap();
    assert_eq!(ctx.read().chart, Hwnd(0x2000));
    for _ in 0..3 {
        host.advance(1);
        assert_eq!(sync.start_main(&ctx).unwrap(), pid);
    }
    assert_eq!(sync.deinit_main(&ctx, UninitializeReason::Parameters).unwrap(), pid);
    assert_eq!(
        sync.init_main(&ctx, &expert("Grid", UninitializeReason::Parameters, Default::default()))
            .unwrap(),
        pid
    );
    assert_eq!(sync.start_main(&ctx).unwrap(), pid);
    assert_eq!(ctx.read().ticks, 4);
    assert_eq!(ctx.read().last_tick_at, Some(host.now()));
}

#[test]
fn test_indicator_started_by_expert_inherits_super_context() {
    let host = FakeHost::new();
    host.add_surface(0x2000, "EURUSD,H1");
    let sync = sync_with(&host);

    let expert_ctx = fresh();
    let expert_pid = sync
        .init_main(&expert_ctx, &expert("Grid", UninitializeReason::Undefined, Default::default()))
        .unwrap();
    expert_ctx.write().logging.level = "debug".to_string();

    let ind = fresh();
    let args = ctxsync::sync::MainInit {
        super_context: Some(&expert_ctx),
        ..indicator("Trend", 0, UninitializeReason::Undefined)
    };
    let pid = sync.init_main(&ind, &args).unwrap();
    assert_ne!(pid, expert_pid);

    let c = ind.read();
    assert_eq!(c.super_pid, Some(expert_pid));
    assert_eq!(c.init_reason, Some(InitializeReason::Program));
    assert_eq!(c.launch_type, Some(LaunchType::Program));
    assert_eq!(c.chart, Hwnd(0x2000));
    assert_eq!(c.logging.level, "debug");
    drop(c);

    let resolved = sync.registry().super_context(&ind).unwrap().unwrap();
    assert!(std::sync::Arc::ptr_eq(&resolved, &expert_ctx));

    sync.deinit_main(&expert_ctx, UninitializeReason::Remove)
        .unwrap();
    assert!(matches!(
        sync.registry().super_context(&ind),
        Err(SyncError::IllegalState(_))
    ));
}

#[test]
fn test_headless_tester_expert() {
    let host = FakeHost::new();
    host.switch_to(crate::integration::test_utils::TESTER_THREAD);
    let sync = sync_with(&host);
    let ctx = fresh();

    sync.init_main(&ctx, &expert("Grid", UninitializeReason::Undefined, tester()))
        .unwrap();
    let c = ctx.read();
    assert_eq!(c.chart, Hwnd::NONE);
    assert_eq!(c.init_reason, Some(InitializeReason::User));
    assert_eq!(c.program_type, Some(ProgramType::Expert));
    assert_eq!(c.module_type, Some(ModuleType::Expert));
    assert!(c.test.testing);
    assert_eq!(c.timeframe, Some(Timeframe::H1));
}

#[test]
fn test_anomaly_leaves_registry_untouched() {
    let host = FakeHost::new();
    let sync = sync_with(&host);
    let ctx = fresh();

    let err = sync
        .init_main(&ctx, &indicator("Foo", 100, UninitializeReason::Account))
        .unwrap_err();
    assert!(err.is_anomaly());
    assert!(sync.registry().is_empty());
    assert!(ctx.read().pid.is_none());
}

#[test]
fn test_script_binds_to_titled_chart() {
    let host = FakeHost::new();
    host.add_surface(0x3000, "EURUSD,H1 (offline)");
    host.add_surface(0x2000, "GBPUSD,H1");
    let sync = sync_with(&host);
    let ctx = fresh();

    let args = ctxsync::sync::MainInit {
        program_type: ProgramType::Script,
        chart: Hwnd::NONE,
        ..indicator("Export", 0, UninitializeReason::Undefined)
    };
    sync.init_main(&ctx, &args).unwrap();
    assert_eq!(ctx.read().chart, Hwnd(0x3000));
    assert_eq!(ctx.read().chart_window, Hwnd(0x3001));
    assert_eq!(ctx.read().module_type, Some(ModuleType::Script));
}

#[test]
fn test_host_enumeration_failure_is_reported() {
    let host = FakeHost::new();
    host.add_surface(100, "EURUSD,H1");
    host.fail_enumeration(true);
    let sync = sync_with(&host);

    let ctx = fresh();
    let err = sync
        .init_main(&ctx, &indicator("Foo", 100, UninitializeReason::Undefined))
        .unwrap_err();
    assert!(matches!(err, SyncError::Host(_)));
    assert_eq!(err.code(), ctxsync::error::codes::ERR_HOST_FAILURE);
    assert_eq!(sync.registry().chain_count(), 0);
    assert_eq!(ctx.read().pid, None);
    assert_eq!(ctx.read().phase, Phase::Uninitialized);
}
