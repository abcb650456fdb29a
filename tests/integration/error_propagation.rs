//! Integration tests for last-error propagation between programs

use crate::integration::test_utils::{expert, fresh, indicator, library, sync_with, FakeHost};
use ctxsync::context::SharedContext;
use ctxsync::sync::{ContextSync, MainInit};
use ctxsync::types::UninitializeReason;
use std::sync::Arc;

struct Setup {
    sync: ContextSync,
    expert: SharedContext,
    indicator: SharedContext,
    lib: SharedContext,
}

/// Expert "Grid" starts indicator "Trend", which loads library "rsfLib".
fn setup() -> Setup {
    let host = FakeHost::new();
    host.add_surface(0x2000, "EURUSD,H1");
    let sync = sync_with(&host);

    let expert_ctx = fresh();
    sync.init_main(
        &expert_ctx,
        &expert("Grid", UninitializeReason::Undefined, Default::default()),
    )
    .unwrap();

    let ind = fresh();
    sync.init_main(
        &ind,
        &MainInit {
            super_context: Some(&expert_ctx),
            ..indicator("Trend", 0, UninitializeReason::Undefined)
        },
    )
    .unwrap();

    let lib = fresh();
    sync.init_library(&lib, &library("rsfLib")).unwrap();
    assert_eq!(lib.read().pid, ind.read().pid);

    Setup {
        sync,
        expert: expert_ctx,
        indicator: ind,
        lib,
    }
}

#[test]
fn test_library_error_reaches_main_and_super() {
    let s = setup();
    s.sync.registry().set_mql_error(&s.lib, 4051).unwrap();

    assert_eq!(s.lib.read().mql_error, 4051);
    assert_eq!(s.indicator.read().mql_error, 4051);
    assert_eq!(s.expert.read().mql_error, 4051);
}

#[test]
fn test_clearing_an_error_does_not_propagate() {
    let s = setup();
    let registry = s.sync.registry();
    registry.set_mql_error(&s.lib, 4051).unwrap();
    registry.set_mql_error(&s.lib, 0).unwrap();

    assert_eq!(s.lib.read().mql_error, 0);
    assert_eq!(s.indicator.read().mql_error, 4051);
    assert_eq!(s.expert.read().mql_error, 4051);
}

#[test]
fn test_main_error_reaches_only_super() {
    let s = setup();
    s.sync.registry().set_mql_error(&s.indicator, 4107).unwrap();

    assert_eq!(s.indicator.read().mql_error, 4107);
    assert_eq!(s.expert.read().mql_error, 4107);
    assert_eq!(s.lib.read().mql_error, 0);
}

#[test]
fn test_error_reaches_master_while_in_limbo() {
    let s = setup();
    let pid = s.indicator.read().pid.unwrap();
    s.sync
        .deinit_main(&s.indicator, UninitializeReason::Parameters)
        .unwrap();

    s.sync.registry().set_mql_error(&s.lib, 4052).unwrap();
    let master = s.sync.registry().master(pid).unwrap();
    assert!(!Arc::ptr_eq(&master, &s.indicator));
    assert_eq!(master.read().mql_error, 4052);
    assert_eq!(s.indicator.read().mql_error, 0);
}
