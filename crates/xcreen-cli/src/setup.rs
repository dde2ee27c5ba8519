//! Mapping from the config schema to session runtime types.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use xcreen_common::XcreenError;
use xcreen_config::schema::{StorageBackend, StorageConfig};
use xcreen_config::XcreenConfig;
use xcreen_session::{DurableStorage, FileStorage, MemoryStorage, RoomCache, SessionOptions};

pub fn session_options(config: &XcreenConfig) -> SessionOptions {
    SessionOptions {
        room_ttl: Duration::from_secs(u64::from(config.session.room_ttl_hours) * 60 * 60),
        event_buffer: config.session.event_buffer as usize,
    }
}

pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn DurableStorage>, XcreenError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::File => {
            let dir = if config.directory.is_empty() {
                FileStorage::default_dir()
                    .ok_or_else(|| XcreenError::Other("no platform data directory".into()))?
            } else {
                PathBuf::from(&config.directory)
            };
            tracing::debug!(dir = %dir.display(), "Using file storage");
            Ok(Arc::new(FileStorage::new(dir)?))
        }
    }
}

pub fn open_cache(config: &XcreenConfig) -> Result<RoomCache, XcreenError> {
    let storage = open_storage(&config.storage)?;
    Ok(RoomCache::new(storage, session_options(config).room_ttl))
}
