//! Configuration schema types for xcreen.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod session;
mod storage;

pub use logging::*;
pub use session::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XcreenConfig {
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}
