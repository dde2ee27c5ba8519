//! Where the config file lives, and seeding it on first run.

use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use xcreen_common::ConfigError;

use super::template::default_config_toml;

const APP_DIR: &str = "xcreen";
const FILE_NAME: &str = "config.toml";

/// `<config dir>/xcreen/config.toml` for the current platform.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|base| base.join(APP_DIR).join(FILE_NAME))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Write the commented template to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let seed = || -> io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, default_config_toml())
    };
    seed().map_err(|e| ConfigError::ParseError(format!("seeding {}: {e}", path.display())))?;

    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
