use crate::settings::*;
use crate::Error;
use tempfile::TempDir;

#[test]
fn test_settings_default() {
    let settings = EngineSettings::default();
    assert_eq!(settings.page_size, 30);
    assert_eq!(settings.typing_idle_ms, 2_000);
    assert_eq!(settings.reconcile_window_ms, 10_000);
    assert!(settings.heuristic_reconcile);
    assert_eq!(settings.tick_interval_ms, 250);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_settings_load_nonexistent_returns_default() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("missing.json");

    let settings = EngineSettings::load(&path).expect("Failed to load settings");
    assert_eq!(settings, EngineSettings::default());
}

#[test]
fn test_settings_load_empty_file_returns_default() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("settings.json");
    std::fs::write(&path, "  \n").expect("Failed to write file");

    let settings = EngineSettings::load(&path).expect("Failed to load settings");
    assert_eq!(settings, EngineSettings::default());
}

#[test]
fn test_settings_save_and_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("nested").join("settings.json");

    let settings = EngineSettings {
        page_size: 50,
        heuristic_reconcile: false,
        ..EngineSettings::default()
    };
    settings.save(&path).expect("Failed to save settings");

    let loaded = EngineSettings::load(&path).expect("Failed to load settings");
    assert_eq!(loaded, settings);
}

#[test]
fn test_settings_partial_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("settings.json");
    std::fs::write(&path, r#"{"page_size": 15}"#).expect("Failed to write file");

    let settings = EngineSettings::load(&path).expect("Failed to load settings");
    assert_eq!(settings.page_size, 15);
    assert_eq!(settings.typing_idle_ms, 2_000);
}

#[test]
fn test_settings_invalid_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").expect("Failed to write file");

    let result = EngineSettings::load(&path);
    assert!(matches!(result, Err(Error::Settings(_))));
}

#[test]
fn test_settings_rejects_zero_values() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("settings.json");
    std::fs::write(&path, r#"{"page_size": 0}"#).expect("Failed to write file");

    assert!(matches!(EngineSettings::load(&path), Err(Error::Settings(_))));

    let settings = EngineSettings {
        tick_interval_ms: 0,
        ..EngineSettings::default()
    };
    assert!(settings.validate().is_err());
}
