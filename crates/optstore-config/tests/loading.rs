//! Settings loading from files and the process environment.

use std::env;
use std::io::Write;

use optstore_config::{SettingsError, SettingsLoader};
use optstore_telemetry::LogFormat;
use tempfile::Builder;

#[test]
fn test_load_toml_file() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[dispatch]
lock_wakeup_interval_ms = 40

[telemetry.logging]
format = "pretty"
"#
    )
    .unwrap();

    let loader = SettingsLoader::new().with_file(file.path()).unwrap();
    assert!(loader.file_loaded());

    let settings = loader.load().unwrap();
    assert_eq!(settings.dispatch.lock_wakeup_interval_ms, 40);
    assert_eq!(settings.telemetry.logging.format, LogFormat::Pretty);
    assert!(settings.telemetry.metrics.enabled);
}

#[test]
fn test_load_json_file() {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"cache": {{"trace_changes": true}}}}"#).unwrap();

    let settings = SettingsLoader::new()
        .with_optional_file(file.path())
        .unwrap()
        .load()
        .unwrap();
    assert!(settings.cache.trace_changes);
}

#[test]
fn test_unknown_extension_rejected() {
    let file = Builder::new().suffix(".ini").tempfile().unwrap();
    let result = SettingsLoader::new().with_file(file.path());
    assert!(matches!(result, Err(SettingsError::ValidationError(_))));
}

#[test]
fn test_environment_overrides_file() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[dispatch]\nlock_wakeup_interval_ms = 40").unwrap();

    // Unique prefix so parallel tests never observe this variable.
    env::set_var("OPTSTORE_LOADING_TEST__DISPATCH__LOCK_WAKEUP_INTERVAL_MS", "75");
    let settings = SettingsLoader::new()
        .with_file(file.path())
        .unwrap()
        .with_env_prefix("optstore_loading_test")
        .load();
    env::remove_var("OPTSTORE_LOADING_TEST__DISPATCH__LOCK_WAKEUP_INTERVAL_MS");

    assert_eq!(settings.unwrap().dispatch.lock_wakeup_interval_ms, 75);
}

#[test]
fn test_settings_drive_dispatch_queue() {
    let settings = SettingsLoader::new()
        .with_string("[dispatch]\nlock_wakeup_interval_ms = 5", "toml")
        .unwrap()
        .load()
        .unwrap();

    let queue = optstore_dispatch::DispatchQueue::with_config(settings.dispatch_config());
    assert_eq!(queue.config().lock_wakeup_interval.as_millis(), 5);
}
