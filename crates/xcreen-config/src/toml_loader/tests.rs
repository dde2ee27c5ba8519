//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::{LogLevel, StorageBackend, XcreenConfig};
use std::path::Path;
use xcreen_common::ConfigError;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_xcreen_config.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r##"
[session]
room_ttl_hours = 2

[storage]
backend = "memory"
"##,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.session.room_ttl_hours, 2);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    // Defaults preserved
    assert_eq!(config.session.event_buffer, 256);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn load_config_with_invalid_values_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[session]
room_ttl_hours = 0
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.session.room_ttl_hours, 24);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xcreen").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.session.room_ttl_hours, 24);
    assert_eq!(config.storage.backend, StorageBackend::File);
}

#[test]
fn default_config_toml_is_valid() {
    use super::template::default_config_toml;

    let config: XcreenConfig = toml::from_str(&default_config_toml()).unwrap();
    assert_eq!(config.session.event_buffer, 256);
}

#[test]
fn default_config_path_is_reasonable() {
    // dirs may not resolve in every CI sandbox
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("xcreen"));
        assert!(path_str.ends_with("config.toml"));
    }
}

#[test]
fn seeding_under_a_file_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("xcreen");
    std::fs::write(&blocker, "not a directory").unwrap();
    let path = blocker.join("config.toml");

    let err = create_default_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(ref m) if m.contains("config.toml")));
}
