//! Full configuration validation.
//!
//! Collects every range and format error into a single `ConfigError`.

mod helpers;


use crate::schema::XcreenConfig;
use helpers::validate_range;
use xcreen_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &XcreenConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_range(
        &mut errors,
        "session.room_ttl_hours",
        config.session.room_ttl_hours,
        1,
        720,
    );
    validate_range(
        &mut errors,
        "session.event_buffer",
        config.session.event_buffer,
        16,
        4096,
    );

    let base_url = &config.session.base_url;
    if !base_url.is_empty() && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
    {
        errors.push(format!(
            "session.base_url = {base_url:?} must start with http:// or https://"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
