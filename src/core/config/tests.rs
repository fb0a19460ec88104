use super::data::{path_display, Config};
use super::io::ConfigError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let config = Config {
        default_model: Some("gemini-2.5-pro".to_string()),
        api_base_url: Some("http://localhost:8080/v1beta".to_string()),
        data_dir: Some(PathBuf::from("/tmp/omnichat-data")),
    };
    config.save_to_path(&config_path).expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);

    let cleared = Config {
        api_base_url: None,
        ..loaded
    };
    cleared.save_to_path(&config_path).expect("Failed to save config");
    let reloaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(reloaded.api_base_url, None);
    assert_eq!(reloaded.default_model.as_deref(), Some("gemini-2.5-pro"));
}

#[test]
fn test_partial_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "default_model = \"gemini-flash-lite-latest\"\n")
        .expect("Failed to write config");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(config.default_model.as_deref(), Some("gemini-flash-lite-latest"));
    assert!(config.api_base_url.is_none());
    assert!(config.data_dir.is_none());
}

#[test]
fn test_invalid_toml_reports_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "default_model = [").expect("Failed to write config");

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn configured_data_dir_wins() {
    let config = Config {
        data_dir: Some(PathBuf::from("/srv/chats")),
        ..Default::default()
    };
    assert_eq!(config.resolve_data_dir(), PathBuf::from("/srv/chats"));
}

#[cfg(unix)]
#[test]
fn path_display_leaves_paths_outside_home_alone() {
    assert_eq!(path_display("/definitely/not/home"), "/definitely/not/home");
}
