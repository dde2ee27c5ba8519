//! xcreen configuration system.
//!
//! TOML-based configuration with validation. All sections use defaults so
//! partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{XcreenConfig, CONFIG_SCHEMA_VERSION};

use std::path::Path;
use xcreen_common::ConfigError;

/// Load config from the platform default path, creating it if missing.
/// A file that fails validation yields the defaults.
pub fn load_config() -> Result<XcreenConfig, ConfigError> {
    toml_loader::load_default()
}

/// Load config from an explicit path override. Same fallback as
/// [`load_config`].
pub fn load_config_from(path: &Path) -> Result<XcreenConfig, ConfigError> {
    toml_loader::load_from_path(path)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &XcreenConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&XcreenConfig::default());
        assert!(json.contains("\"session\""));
        assert!(json.contains("\"storage\""));
        assert!(json.contains("\"logging\""));
        assert!(json.contains("\"INFO\""));
    }

    #[test]
    fn out_of_range_override_loads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nevent_buffer = 8\n[logging]\nlevel = \"DEBUG\"\n").unwrap();

        let config = load_config_from(&path).unwrap();
        assert!(validation::validate(&config).is_ok());
        assert_eq!(config.session.event_buffer, 256);
        assert_eq!(config.logging.level, schema::LogLevel::Info);
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let json = config_to_json(&XcreenConfig::default());
        let parsed: XcreenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session.room_ttl_hours, 24);
        assert_eq!(parsed.storage.backend, schema::StorageBackend::File);
    }
}
