//! Reload-safe room metadata: an in-memory map written through to
//! [`DurableStorage`].
//!
//! Reads never fail. A missing, expired, or malformed record is reported as
//! the empty session (`room_id == ""`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xcreen_common::SessionError;

use crate::storage::DurableStorage;
use crate::sync::{read, write};

/// Most recently written room. Read by a `get` without an id.
pub const LATEST_KEY: &str = "room_info";
/// Legacy single-value mirrors.
pub const ROOM_ID_KEY: &str = "room_id";
pub const STREAM_ACTIVE_KEY: &str = "is_stream_active";

pub fn room_key(room_id: &str) -> String {
    format!("{LATEST_KEY}:{room_id}")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata for one sharing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSession {
    pub room_id: String,
    #[serde(default)]
    pub is_stream_active: bool,
    #[serde(default, rename = "viewers")]
    pub viewer_count: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_active: DateTime<Utc>,
}

impl RoomSession {
    /// The "no session" value.
    pub fn empty() -> Self {
        Self::new("")
    }

    pub fn new(room_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            room_id: room_id.into(),
            is_stream_active: false,
            viewer_count: 0,
            created_at: now,
            last_active: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.room_id.is_empty()
    }

    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_active > ttl
    }

    fn apply(&mut self, update: &RoomUpdate) {
        if let Some(active) = update.is_stream_active {
            self.is_stream_active = active;
        }
        if let Some(count) = update.viewer_count {
            self.viewer_count = count;
        }
    }
}

/// Partial update merged by [`RoomCache::update`]. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomUpdate {
    pub is_stream_active: Option<bool>,
    pub viewer_count: Option<usize>,
}

impl RoomUpdate {
    pub fn stream_active(active: bool) -> Self {
        Self {
            is_stream_active: Some(active),
            ..Self::default()
        }
    }

    pub fn viewers(count: usize) -> Self {
        Self {
            viewer_count: Some(count),
            ..Self::default()
        }
    }

    pub fn with_viewers(mut self, count: usize) -> Self {
        self.viewer_count = Some(count);
        self
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Room id → [`RoomSession`], shared by every state machine that touches a
/// room. Clones share the same map and storage.
#[derive(Clone)]
pub struct RoomCache {
    memory: Arc<RwLock<HashMap<String, RoomSession>>>,
    storage: Arc<dyn DurableStorage>,
    ttl: chrono::Duration,
}

impl RoomCache {
    pub fn new(storage: Arc<dyn DurableStorage>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            memory: Arc::new(RwLock::new(HashMap::new())),
            storage,
            ttl,
        }
    }

    /// Look up a room, or the most recently written one when `room_id` is
    /// `None`. A hit refreshes `last_active`.
    pub fn get(&self, room_id: Option<&str>) -> RoomSession {
        let now = Utc::now();
        let room_id = room_id.filter(|id| !id.is_empty());

        let found = match room_id {
            Some(id) => self.from_memory(id, now).or_else(|| self.from_storage(id, now)),
            None => self.latest_from_storage(now),
        };

        match found {
            Some(mut session) => {
                session.last_active = now;
                self.store(&session);
                session
            }
            None => RoomSession::empty(),
        }
    }

    /// Merge `update` into the room's entry, creating it if needed.
    /// Returns the empty session when `room_id` is empty.
    pub fn update(&self, update: RoomUpdate, room_id: &str) -> RoomSession {
        if room_id.is_empty() {
            return RoomSession::empty();
        }
        let now = Utc::now();
        let mut memory = write(&self.memory);
        let mut session = memory
            .get(room_id)
            .filter(|s| !s.is_expired(self.ttl, now))
            .cloned()
            .or_else(|| self.load(&room_key(room_id), now))
            .filter(|s| s.room_id == room_id)
            .unwrap_or_else(|| RoomSession::new(room_id));

        session.apply(&update);
        session.last_active = now;
        memory.insert(room_id.to_string(), session.clone());
        drop(memory);

        self.persist(&session);
        if let Some(active) = update.is_stream_active {
            self.set_item(STREAM_ACTIVE_KEY, if active { "true" } else { "false" });
        }
        debug!(
            room_id,
            is_stream_active = session.is_stream_active,
            viewers = session.viewer_count,
            "Room info updated"
        );
        session
    }

    /// Register a room (no field changes) and record it in the legacy
    /// `room_id` mirror.
    pub fn initialize(&self, room_id: &str) -> RoomSession {
        let session = self.update(RoomUpdate::default(), room_id);
        if !session.is_empty() {
            self.set_item(ROOM_ID_KEY, room_id);
        }
        session
    }

    /// Forget a room in memory and storage, along with any legacy mirror
    /// that points at it.
    pub fn clear(&self, room_id: &str) {
        if room_id.is_empty() {
            return;
        }
        write(&self.memory).remove(room_id);
        self.remove_item(&room_key(room_id));

        let latest_is_ours = match self.storage.get_item(LATEST_KEY) {
            Some(raw) => serde_json::from_str::<RoomSession>(&raw)
                .map(|s| s.room_id == room_id)
                .unwrap_or(true),
            None => false,
        };
        let mirror_is_ours = self.storage.get_item(ROOM_ID_KEY).as_deref() == Some(room_id);

        if latest_is_ours {
            self.remove_item(LATEST_KEY);
        }
        if mirror_is_ours {
            self.remove_item(ROOM_ID_KEY);
        }
        if latest_is_ours || mirror_is_ours {
            self.remove_item(STREAM_ACTIVE_KEY);
        }
        debug!(room_id, "Room info cleared");
    }

    fn from_memory(&self, room_id: &str, now: DateTime<Utc>) -> Option<RoomSession> {
        let session = read(&self.memory).get(room_id).cloned()?;
        if session.is_expired(self.ttl, now) {
            write(&self.memory).remove(room_id);
            return None;
        }
        Some(session)
    }

    fn from_storage(&self, room_id: &str, now: DateTime<Utc>) -> Option<RoomSession> {
        self.load(&room_key(room_id), now)
            .filter(|s| s.room_id == room_id)
    }

    fn latest_from_storage(&self, now: DateTime<Utc>) -> Option<RoomSession> {
        self.load(LATEST_KEY, now).filter(|s| !s.is_empty())
    }

    /// Parse a stored record. Malformed and expired records are removed.
    fn load(&self, key: &str, now: DateTime<Utc>) -> Option<RoomSession> {
        let raw = self.storage.get_item(key)?;
        let session = match serde_json::from_str::<RoomSession>(&raw) {
            Ok(session) => session,
            Err(e) => {
                let err = SessionError::CacheCorruption(e.to_string());
                warn!(key, error = %err, "Discarding malformed room record");
                self.remove_item(key);
                return None;
            }
        };
        if session.is_expired(self.ttl, now) {
            debug!(key, room_id = %session.room_id, "Room record expired");
            self.remove_item(key);
            return None;
        }
        Some(session)
    }

    fn store(&self, session: &RoomSession) {
        write(&self.memory).insert(session.room_id.clone(), session.clone());
        self.persist(session);
    }

    fn persist(&self, session: &RoomSession) {
        match serde_json::to_string(session) {
            Ok(json) => {
                self.set_item(&room_key(&session.room_id), &json);
                self.set_item(LATEST_KEY, &json);
            }
            Err(e) => warn!(room_id = %session.room_id, error = %e, "Failed to encode room info"),
        }
    }

    fn set_item(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set_item(key, value) {
            warn!(key, error = %e, "Durable storage write failed");
        }
    }

    fn remove_item(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(key) {
            warn!(key, error = %e, "Durable storage remove failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn cache() -> (RoomCache, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (RoomCache::new(storage.clone(), DAY), storage)
    }

    fn record(room_id: &str, active: bool, age: chrono::Duration) -> String {
        let mut session = RoomSession::new(room_id);
        session.is_stream_active = active;
        session.last_active = Utc::now() - age;
        serde_json::to_string(&session).unwrap()
    }

    #[test]
    fn missing_room_is_empty() {
        let (cache, _) = cache();
        let session = cache.get(Some("abc123"));
        assert!(session.is_empty());
        assert!(!session.is_stream_active);
        assert_eq!(session.viewer_count, 0);
        assert!(cache.get(None).is_empty());
    }

    #[test]
    fn update_then_get_merges_and_refreshes() {
        let (cache, _) = cache();
        let before = Utc::now();
        cache.update(RoomUpdate::viewers(2), "abc123");
        cache.update(RoomUpdate::stream_active(true), "abc123");

        let session = cache.get(Some("abc123"));
        assert_eq!(session.room_id, "abc123");
        assert!(session.is_stream_active);
        assert_eq!(session.viewer_count, 2);
        assert!(session.last_active >= before);
        assert!(session.created_at <= session.last_active);
    }

    #[test]
    fn update_with_empty_id_is_noop() {
        let (cache, storage) = cache();
        let session = cache.update(RoomUpdate::stream_active(true), "");
        assert!(session.is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn update_writes_through_with_mirrors() {
        let (cache, storage) = cache();
        cache.update(RoomUpdate::stream_active(true), "abc123");

        assert!(storage.get_item("room_info:abc123").is_some());
        assert!(storage.get_item(LATEST_KEY).is_some());
        assert_eq!(storage.get_item(STREAM_ACTIVE_KEY).as_deref(), Some("true"));

        cache.update(RoomUpdate::viewers(1), "abc123");
        // untouched field keeps its mirror
        assert_eq!(storage.get_item(STREAM_ACTIVE_KEY).as_deref(), Some("true"));
    }

    #[test]
    fn durable_record_survives_new_cache() {
        let (cache, storage) = cache();
        cache.update(RoomUpdate::stream_active(true).with_viewers(3), "abc123");

        let reloaded = RoomCache::new(storage, DAY);
        let session = reloaded.get(Some("abc123"));
        assert!(session.is_stream_active);
        assert_eq!(session.viewer_count, 3);
        assert_eq!(reloaded.get(None).room_id, "abc123");
    }

    #[test]
    fn expired_record_is_absent() {
        let (cache, storage) = cache();
        storage
            .set_item("room_info:abc123", &record("abc123", true, chrono::Duration::hours(25)))
            .unwrap();
        storage
            .set_item(LATEST_KEY, &record("abc123", true, chrono::Duration::hours(25)))
            .unwrap();

        assert!(cache.get(Some("abc123")).is_empty());
        assert!(cache.get(None).is_empty());
        assert!(storage.get_item("room_info:abc123").is_none());
    }

    #[test]
    fn fresh_record_is_resumed() {
        let (cache, storage) = cache();
        storage
            .set_item(LATEST_KEY, &record("abc123", true, chrono::Duration::hours(1)))
            .unwrap();

        let before = Utc::now();
        let session = cache.get(None);
        assert_eq!(session.room_id, "abc123");
        assert!(session.is_stream_active);
        assert!(session.last_active >= before);
    }

    #[test]
    fn expired_memory_entry_is_dropped() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = RoomCache::new(storage.clone(), Duration::from_millis(10));
        cache.update(RoomUpdate::viewers(1), "abc123");
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(Some("abc123")).is_empty());
    }

    #[test]
    fn malformed_record_is_discarded() {
        let (cache, storage) = cache();
        storage.set_item("room_info:abc123", "{not json").unwrap();
        storage.set_item(LATEST_KEY, "[]").unwrap();

        assert!(cache.get(Some("abc123")).is_empty());
        assert!(cache.get(None).is_empty());
        assert!(storage.get_item("room_info:abc123").is_none());
        assert!(storage.get_item(LATEST_KEY).is_none());

        // the room is usable again afterwards
        let session = cache.update(RoomUpdate::viewers(1), "abc123");
        assert_eq!(session.viewer_count, 1);
    }

    #[test]
    fn clear_then_get_is_empty() {
        let (cache, storage) = cache();
        cache.initialize("abc123");
        cache.update(RoomUpdate::stream_active(true), "abc123");
        assert_eq!(storage.get_item(ROOM_ID_KEY).as_deref(), Some("abc123"));

        cache.clear("abc123");
        assert!(cache.get(Some("abc123")).is_empty());
        assert!(cache.get(None).is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn clear_leaves_other_rooms_alone() {
        let (cache, storage) = cache();
        cache.update(RoomUpdate::viewers(1), "first");
        cache.update(RoomUpdate::viewers(2), "second");

        cache.clear("first");
        assert!(cache.get(Some("first")).is_empty());
        assert_eq!(cache.get(Some("second")).viewer_count, 2);
        assert!(storage.get_item(LATEST_KEY).is_some());
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let json = serde_json::to_string(&RoomSession::new("abc123")).unwrap();
        assert!(json.contains("\"roomId\":\"abc123\""));
        assert!(json.contains("\"isStreamActive\":false"));
        assert!(json.contains("\"viewers\":0"));
        assert!(json.contains("\"lastActive\""));
    }

    #[test]
    fn file_backed_cache_recovers_after_restart() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(tmp.path()).unwrap());
        RoomCache::new(storage, DAY).update(RoomUpdate::stream_active(true), "abc123");

        let storage = Arc::new(FileStorage::new(tmp.path()).unwrap());
        let session = RoomCache::new(storage, DAY).get(None);
        assert_eq!(session.room_id, "abc123");
        assert!(session.is_stream_active);
    }
}
