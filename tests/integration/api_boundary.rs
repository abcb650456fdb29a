//! Integration tests for the host-facing API

use crate::integration::test_utils::{fresh, sync_with, FakeHost};
use ctxsync::api::{self, LibTransition, MainTransition, RawLibInit, RawMainInit};
use ctxsync::config::RegistryConfig;
use ctxsync::error::codes;
use ctxsync::types::{Hwnd, Phase, ProgramType, UninitializeReason};
use ctxsync::ContextApi;

fn raw_indicator(chart: u32, uninit_reason: UninitializeReason) -> RawMainInit<'static> {
    RawMainInit {
        program_type: ProgramType::Indicator as u32,
        program_name: "Foo",
        uninit_reason: uninit_reason as u32,
        init_flags: 0,
        deinit_flags: 0,
        symbol: "EURUSD",
        timeframe: 15,
        chart,
        testing: false,
        visual_mode: false,
        optimization: false,
        super_context: None,
    }
}

#[test]
fn test_full_cycle_through_api() {
    let host = FakeHost::new();
    host.add_surface(0x4000, "EURUSD,M15");
    let api = ContextApi::new(sync_with(&host), &RegistryConfig::default());

    let main = fresh();
    let init = MainTransition::Init(raw_indicator(0x4000, UninitializeReason::Undefined));
    assert_eq!(api.sync_main_context(Some(&main), init), codes::NO_ERROR);
    assert_eq!(api.sync_main_context(Some(&main), MainTransition::Start), codes::NO_ERROR);

    let lib = fresh();
    let lib_init = LibTransition::Init(RawLibInit {
        module_name: "rsfLib",
        uninit_reason: 0,
        symbol: "EURUSD",
        timeframe: 15,
    });
    assert_eq!(api.sync_lib_context(Some(&lib), lib_init), codes::NO_ERROR);
    assert_eq!(api::ec_pid(Some(&lib)), api::ec_pid(Some(&main)));
    assert_eq!(api::ec_module_name(Some(&lib)), "rsfLib");
    assert_eq!(api::ec_program_name(Some(&lib)), "Foo");

    assert!(api.set_mql_error(Some(&lib), 4051));
    assert_eq!(api::ec_mql_error(Some(&main)), 4051);

    let deinit = MainTransition::Deinit {
        uninit_reason: UninitializeReason::Remove as u32,
    };
    assert_eq!(api.sync_main_context(Some(&main), deinit), codes::NO_ERROR);
    assert_eq!(api::ec_phase(Some(&main)), Phase::InDeinit as u32);
    assert_eq!(api::ec_chart(Some(&main)), Hwnd(0x4000));
    assert_eq!(api::ec_chart_window(Some(&main)), Hwnd(0x4001));
    assert!(api.registry().chain(main.read().pid.unwrap()).unwrap().read().is_in_limbo());
}

#[test]
fn test_bad_codes_are_invalid_parameters() {
    let host = FakeHost::new();
    let api = ContextApi::new(sync_with(&host), &RegistryConfig::default());
    let main = fresh();

    let mut raw = raw_indicator(0x4000, UninitializeReason::Undefined);
    raw.program_type = 3;
    assert_eq!(
        api.sync_main_context(Some(&main), MainTransition::Init(raw)),
        codes::ERR_INVALID_PARAMETER
    );

    let mut raw = raw_indicator(0x4000, UninitializeReason::Undefined);
    raw.uninit_reason = 42;
    assert_eq!(
        api.sync_main_context(Some(&main), MainTransition::Init(raw)),
        codes::ERR_INVALID_PARAMETER
    );
    assert_eq!(api::ec_dll_error(Some(&main)), codes::ERR_INVALID_PARAMETER);
    assert_eq!(api::ec_pid(Some(&main)), 0);
}

#[test]
fn test_super_context_accessor() {
    let host = FakeHost::new();
    host.add_surface(0x4000, "EURUSD,M15");
    let api = ContextApi::new(sync_with(&host), &RegistryConfig::default());

    let parent = fresh();
    let mut raw = raw_indicator(0x4000, UninitializeReason::Undefined);
    raw.program_name = "Parent";
    assert_eq!(
        api.sync_main_context(Some(&parent), MainTransition::Init(raw)),
        codes::NO_ERROR
    );
    assert!(api.super_context(Some(&parent)).is_none());

    let child = fresh();
    let mut raw = raw_indicator(0, UninitializeReason::Undefined);
    raw.super_context = Some(&parent);
    assert_eq!(
        api.sync_main_context(Some(&child), MainTransition::Init(raw)),
        codes::NO_ERROR
    );
    assert_eq!(api::ec_super_pid(Some(&child)), api::ec_pid(Some(&parent)));
    assert!(api.super_context(Some(&child)).is_some());
}

#[test]
fn test_host_failure_leaves_registry_unchanged() {
    let host = FakeHost::new();
    host.add_surface(0x4000, "EURUSD,M15");
    host.fail_enumeration(true);
    let api = ContextApi::new(sync_with(&host), &RegistryConfig::default());

    let main = fresh();
    let init = MainTransition::Init(raw_indicator(0x4000, UninitializeReason::Undefined));
    assert_eq!(api.sync_main_context(Some(&main), init), codes::ERR_HOST_FAILURE);
    assert_eq!(api::ec_dll_error(Some(&main)), codes::ERR_HOST_FAILURE);
    assert_eq!(api::ec_pid(Some(&main)), 0);
    assert_eq!(api.registry().chain_count(), 0);

    host.fail_enumeration(false);
    let init = MainTransition::Init(raw_indicator(0x4000, UninitializeReason::Undefined));
    assert_eq!(api.sync_main_context(Some(&main), init), codes::NO_ERROR);
    assert_eq!(api.registry().chain_count(), 1);
    assert_eq!(api::ec_chart_window(Some(&main)), Hwnd(0x4001));
}
