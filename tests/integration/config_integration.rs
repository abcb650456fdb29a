//! Integration tests for configuration loading

use crate::integration::test_utils::{expert, fresh, indicator, tester, FakeHost, TESTER_THREAD};
use ctxsync::compat::HostQuirk;
use ctxsync::config::{ConfigLoader, SyncConfig};
use ctxsync::error::SyncError;
use ctxsync::sync::{ContextSync, MainInit};
use ctxsync::types::{InitializeReason, UninitializeReason};
use ctxsync::ContextRegistry;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"

[logging.modules]
"ctxsync::limbo" = "trace"

[programs]
level = "warn"
mirror_to_terminal = false

[registry]
min_valid_handle = 8192

[[compat]]
quirk = "after_test_reports_chart_close"
first_build = 1400
"#;

#[test]
fn test_load_from_directory() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("ctxsync.toml"), CONFIG).unwrap();

    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.logging.modules["ctxsync::limbo"], "trace");
    assert_eq!(config.programs.level, "warn");
    assert!(config.programs.enabled);
    assert!(!config.programs.mirror_to_terminal);
    assert_eq!(config.registry.min_valid_handle, 8192);
    assert_eq!(config.compat.len(), 1);
    assert_eq!(config.compat[0].quirk, HostQuirk::AfterTestReportsChartClose);
    assert_eq!(config.compat[0].last_build, None);
}

#[test]
fn test_missing_file_in_directory_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config, SyncConfig::default());
}

#[test]
fn test_invalid_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[[compat]]
quirk = "template_reports_chart_close"
first_build = 900
last_build = 800
"#,
    )
    .unwrap();

    let err = ConfigLoader::load_from_file(&path).unwrap_err();
    match err {
        SyncError::Config(msg) => assert!(msg.contains("Compat entry 0")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_configured_quirk_changes_resolution() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ctxsync.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = ConfigLoader::load_from_file(&path).unwrap();

    let host = FakeHost::new();
    host.switch_to(TESTER_THREAD);
    let configured = ContextSync::from_config(Arc::new(ContextRegistry::new()), host.clone(), &config);
    let builtin = ContextSync::new(Arc::new(ContextRegistry::new()), host.clone());

    for sync in [&configured, &builtin] {
        let expert_ctx = fresh();
        sync.init_main(&expert_ctx, &expert("Grid", UninitializeReason::Undefined, tester()))
            .unwrap();
        let ind = fresh();
        let args = MainInit {
            super_context: Some(&expert_ctx),
            ..indicator("Trend", 0, UninitializeReason::ChartClose)
        };
        let result = sync.init_main(&ind, &args);
        if std::ptr::eq(sync, &configured) {
            assert_eq!(result.unwrap(), ind.read().pid.unwrap());
            assert_eq!(ind.read().init_reason, Some(InitializeReason::ProgramAfterTest));
            assert_eq!(ind.read().logging.level, "warn");
        } else {
            assert!(result.unwrap_err().is_anomaly());
        }
    }
}
