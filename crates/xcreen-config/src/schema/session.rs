//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Session orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hours of inactivity after which a cached room is treated as absent
    /// (valid range: 1-720).
    pub room_ttl_hours: u32,
    /// Capacity of each presentation/transport event channel (16-4096).
    pub event_buffer: u32,
    /// Base URL used when building share links. Empty disables links.
    pub base_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room_ttl_hours: 24,
            event_buffer: 256,
            base_url: String::new(),
        }
    }
}
