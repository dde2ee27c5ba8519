//! Host-side map of connected participants.
//!
//! Every mutation writes the new viewer count through to the
//! [`RoomCache`], so the cached count always equals [`ConnectionRegistry::len`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::media::{MediaController, MediaStream};
use crate::room_cache::{RoomCache, RoomUpdate};
use crate::transport::{DataLink, MediaCall};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One participant's data link plus at most one media call on it.
#[derive(Debug)]
pub struct PeerLink {
    link: Arc<dyn DataLink>,
    media_call: Option<Arc<dyn MediaCall>>,
    /// Id of the stream `media_call` carries.
    stream_id: Option<String>,
}

impl PeerLink {
    pub fn new(link: Arc<dyn DataLink>) -> Self {
        Self {
            link,
            media_call: None,
            stream_id: None,
        }
    }

    pub fn remote_id(&self) -> &str {
        self.link.remote_id()
    }

    pub fn link(&self) -> &Arc<dyn DataLink> {
        &self.link
    }

    pub fn media_call(&self) -> Option<&Arc<dyn MediaCall>> {
        self.media_call.as_ref()
    }

    pub fn carries(&self, stream: &MediaStream) -> bool {
        self.media_call.is_some() && self.stream_id.as_deref() == Some(stream.id())
    }

    pub fn set_call(&mut self, call: Arc<dyn MediaCall>, stream_id: &str) {
        self.media_call = Some(call);
        self.stream_id = Some(stream_id.to_string());
    }

    pub fn take_call(&mut self) -> Option<Arc<dyn MediaCall>> {
        self.stream_id = None;
        self.media_call.take()
    }

    /// Close the media call, then the link.
    pub async fn close(mut self) {
        if let Some(call) = self.take_call() {
            call.close().await;
        }
        self.link.close().await;
    }
}

/// Result of [`ConnectionRegistry::broadcast`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Links that started carrying the stream.
    pub attached: Vec<String>,
    /// Links the call could not be started on.
    pub failed: Vec<String>,
}

impl BroadcastOutcome {
    /// Whether any link now carries the stream, including ones that already did.
    pub fn reached_any(&self, total: usize) -> bool {
        total > self.failed.len()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct ConnectionRegistry {
    room_id: String,
    links: HashMap<String, PeerLink>,
    cache: RoomCache,
}

impl ConnectionRegistry {
    pub fn new(room_id: impl Into<String>, cache: RoomCache) -> Self {
        Self {
            room_id: room_id.into(),
            links: HashMap::new(),
            cache,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Register an inbound link. A link with the same remote id is
    /// replaced and handed back so the caller can close it.
    pub fn add(&mut self, link: Arc<dyn DataLink>) -> Option<PeerLink> {
        let remote_id = link.remote_id().to_string();
        let replaced = self.links.insert(remote_id.clone(), PeerLink::new(link));
        self.sync_count();
        if replaced.is_some() {
            warn!(room_id = %self.room_id, remote_id, "Replacing existing link");
        } else {
            info!(room_id = %self.room_id, remote_id, viewers = self.links.len(), "Viewer registered");
        }
        replaced
    }

    /// Deregister a link. Absent ids are a no-op.
    pub fn remove(&mut self, remote_id: &str) -> Option<PeerLink> {
        let removed = self.links.remove(remote_id)?;
        self.sync_count();
        info!(room_id = %self.room_id, remote_id, viewers = self.links.len(), "Viewer removed");
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.links.contains_key(remote_id)
    }

    pub fn get_mut(&mut self, remote_id: &str) -> Option<&mut PeerLink> {
        self.links.get_mut(remote_id)
    }

    pub fn remote_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.links.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remote ids whose media call carries `stream`.
    pub fn carrying(&self, stream: &MediaStream) -> Vec<String> {
        let mut ids: Vec<String> = self
            .links
            .values()
            .filter(|l| l.carries(stream))
            .map(|l| l.remote_id().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Attach `stream` to every link that does not carry it yet, starting
    /// with `first` when given. Failures are collected, not fatal.
    pub async fn broadcast(
        &mut self,
        media: &MediaController,
        stream: &MediaStream,
        first: Option<&str>,
    ) -> BroadcastOutcome {
        let mut order = self.remote_ids();
        if let Some(first) = first {
            if let Some(pos) = order.iter().position(|id| id == first) {
                let id = order.remove(pos);
                order.insert(0, id);
            }
        }

        let mut outcome = BroadcastOutcome::default();
        for remote_id in order {
            let Some(link) = self.links.get_mut(&remote_id) else {
                continue;
            };
            match media.attach_outgoing(stream, link).await {
                Ok(true) => outcome.attached.push(remote_id),
                Ok(false) => {}
                Err(e) => {
                    warn!(room_id = %self.room_id, remote_id, error = %e, "Failed to attach stream");
                    outcome.failed.push(remote_id);
                }
            }
        }
        debug!(
            room_id = %self.room_id,
            attached = outcome.attached.len(),
            failed = outcome.failed.len(),
            "Broadcast finished"
        );
        outcome
    }

    /// Attach `stream` to a single link.
    pub async fn attach_to(
        &mut self,
        media: &MediaController,
        stream: &MediaStream,
        remote_id: &str,
    ) -> Option<bool> {
        let link = self.links.get_mut(remote_id)?;
        match media.attach_outgoing(stream, link).await {
            Ok(attached) => Some(attached),
            Err(e) => {
                warn!(room_id = %self.room_id, remote_id, error = %e, "Failed to attach stream");
                None
            }
        }
    }

    /// Close the media calls carrying `stream_id`. Links stay registered.
    pub async fn detach_stream(&mut self, stream_id: &str) -> usize {
        let mut closed = 0;
        for link in self.links.values_mut() {
            if link.stream_id.as_deref() != Some(stream_id) {
                continue;
            }
            if let Some(call) = link.take_call() {
                call.close().await;
                closed += 1;
            }
        }
        closed
    }

    /// Close and deregister every link.
    pub async fn close_all(&mut self) -> usize {
        let links: Vec<PeerLink> = self.links.drain().map(|(_, l)| l).collect();
        let count = links.len();
        self.sync_count();
        for link in links {
            link.close().await;
        }
        count
    }

    fn sync_count(&self) {
        self.cache
            .update(RoomUpdate::viewers(self.links.len()), &self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackNetwork, SyntheticCapture};
    use crate::storage::MemoryStorage;
    use crate::test_support::FakeLink;
    use crate::transport::PeerTransport;
    use std::time::Duration;

    fn registry() -> ConnectionRegistry {
        let cache = RoomCache::new(Arc::new(MemoryStorage::new()), Duration::from_secs(3600));
        ConnectionRegistry::new("abc123", cache)
    }

    fn cached_viewers(registry: &ConnectionRegistry) -> usize {
        registry.cache.get(Some("abc123")).viewer_count
    }

    #[test]
    fn viewer_count_tracks_registry() {
        let mut registry = registry();
        let ops: &[(bool, &str)] = &[
            (true, "a"),
            (true, "b"),
            (false, "a"),
            (false, "a"),
            (true, "c"),
            (true, "b"),
            (false, "zzz"),
            (true, "d"),
            (false, "b"),
            (false, "c"),
            (false, "d"),
            (false, "d"),
        ];
        for (add, id) in ops {
            if *add {
                registry.add(FakeLink::new(id));
            } else {
                registry.remove(id);
            }
            assert_eq!(cached_viewers(&registry), registry.len(), "after {add} {id}");
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn add_replaces_same_remote_id() {
        let mut registry = registry();
        assert!(registry.add(FakeLink::new("a")).is_none());
        let replaced = registry.add(FakeLink::new("a"));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(cached_viewers(&registry), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = registry();
        registry.add(FakeLink::new("a"));
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(cached_viewers(&registry), 0);
    }

    #[tokio::test]
    async fn close_all_closes_each_link_once() {
        let mut registry = registry();
        let a = FakeLink::new("a");
        let b = FakeLink::new("b");
        registry.add(a.clone());
        registry.add(b.clone());

        assert_eq!(registry.close_all().await, 2);
        assert_eq!(registry.close_all().await, 0);
        assert_eq!(a.close_count(), 1);
        assert_eq!(b.close_count(), 1);
        assert_eq!(cached_viewers(&registry), 0);
    }

    #[tokio::test]
    async fn broadcast_skips_links_already_carrying() {
        let network = LoopbackNetwork::new();
        let host = network.peer();
        let _host_rx = host.open("abc123").await.unwrap();
        let viewer_a = network.peer();
        let _a_rx = viewer_a.open("a").await.unwrap();
        let viewer_b = network.peer();
        let _b_rx = viewer_b.open("b").await.unwrap();

        let capture = Arc::new(SyntheticCapture::new());
        let (media, _signals) = MediaController::new(capture, host, 16);
        let stream = media.acquire_display_media().await.unwrap();

        let mut registry = registry();
        registry.add(FakeLink::new("a"));
        let first = registry.broadcast(&media, &stream, None).await;
        assert_eq!(first.attached, vec!["a".to_string()]);

        registry.add(FakeLink::new("b"));
        let second = registry.broadcast(&media, &stream, Some("b")).await;
        assert_eq!(second.attached, vec!["b".to_string()]);
        assert_eq!(registry.carrying(&stream), vec!["a".to_string(), "b".to_string()]);

        assert_eq!(registry.detach_stream(stream.id()).await, 2);
        assert!(registry.carrying(&stream).is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn broadcast_collects_failures() {
        let network = LoopbackNetwork::new();
        let host = network.peer();
        let _host_rx = host.open("abc123").await.unwrap();
        let capture = Arc::new(SyntheticCapture::new());
        let (media, _signals) = MediaController::new(capture, host, 16);
        let stream = media.acquire_display_media().await.unwrap();

        let mut registry = registry();
        registry.add(FakeLink::new("ghost"));
        let outcome = registry.broadcast(&media, &stream, None).await;
        assert_eq!(outcome.failed, vec!["ghost".to_string()]);
        assert!(!outcome.reached_any(registry.len()));
        assert!(registry.contains("ghost"));
    }
}
