use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xcreen_common::{new_room_code, Notification, SessionError, SessionId};

use crate::call::CallEndpoint;
use crate::events::{publish, SessionEvent};
use crate::identity::{Endpoint, PeerIdentity, PeerRole};
use crate::media::{MediaController, MediaDevices};
use crate::options::SessionOptions;
use crate::pump;
use crate::registry::ConnectionRegistry;
use crate::room_cache::{RoomCache, RoomUpdate};
use crate::state::SessionState;
use crate::sync::lock;
use crate::transport::PeerTransport;

use super::types::{HostInner, HostState};

// ---------------------------------------------------------------------------
// Host Session
// ---------------------------------------------------------------------------

/// The host's state machine for one room. Clones share the same session.
#[derive(Clone)]
pub struct HostSession {
    pub(super) inner: Arc<HostInner>,
}

impl HostSession {
    pub fn new(
        options: SessionOptions,
        cache: RoomCache,
        transport: Arc<dyn PeerTransport>,
        devices: Arc<dyn MediaDevices>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(options.event_buffer.max(1));
        let (media, media_rx) =
            MediaController::new(devices.clone(), transport.clone(), options.event_buffer);
        let (state_tx, _) = watch::channel(SessionState::Idle);

        let session = Self {
            inner: Arc::new(HostInner {
                options,
                cache,
                transport,
                devices,
                media,
                state: tokio::sync::Mutex::new(HostState {
                    state: SessionState::Idle,
                    session_id: SessionId::new(),
                    room_id: String::new(),
                    registry: None,
                    resume_pending: false,
                }),
                cancel: Mutex::new(CancellationToken::new()),
                media_rx: Mutex::new(Some(media_rx)),
                call: tokio::sync::Mutex::new(None),
                event_tx,
                state_tx,
            }),
        };
        (session, event_rx)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the session reaches `target`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, target: SessionState, timeout: Duration) -> bool {
        let mut rx = self.subscribe_state();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        );
        reached
    }

    pub async fn room_id(&self) -> Option<String> {
        let st = self.inner.state.lock().await;
        (!st.room_id.is_empty()).then(|| st.room_id.clone())
    }

    pub async fn viewer_count(&self) -> usize {
        let st = self.inner.state.lock().await;
        st.registry.as_ref().map_or(0, |r| r.len())
    }

    /// Remote ids of connected viewers, sorted.
    pub async fn viewers(&self) -> Vec<String> {
        let st = self.inner.state.lock().await;
        st.registry.as_ref().map(|r| r.remote_ids()).unwrap_or_default()
    }

    pub fn cache(&self) -> &RoomCache {
        &self.inner.cache
    }

    /// Claim a room and open the transport under its id.
    ///
    /// With `None`, the most recent unexpired cached room is resumed, or a
    /// fresh room code is generated. Returns the room id once the transport
    /// accepted it; the session reaches `Open` when the transport reports
    /// ready.
    pub async fn enter(&self, room: Option<&str>) -> Result<String, SessionError> {
        let inner = &self.inner;
        let mut st = inner.state.lock().await;
        if st.state == SessionState::Ended {
            return Err(SessionError::SessionEnded);
        }
        if !st.state.can_transition_to(SessionState::Connecting) {
            return Err(SessionError::InvalidTransition {
                from: st.state.to_string(),
                to: SessionState::Connecting.to_string(),
            });
        }

        let requested = room.map(str::trim).filter(|r| !r.is_empty());
        let cached = inner.cache.get(requested);
        let code = match requested {
            Some(id) => id.to_string(),
            None if !cached.is_empty() => cached.room_id.clone(),
            None => new_room_code(),
        };
        let room_id = PeerIdentity::new().resolve(&code, PeerRole::Host, Endpoint::Primary);
        let resumed = !cached.is_empty();

        st.session_id = SessionId::new();
        st.room_id = room_id.clone();
        st.registry = Some(ConnectionRegistry::new(&room_id, inner.cache.clone()));
        st.resume_pending = resumed && cached.is_stream_active;
        self.set_state(&mut st, SessionState::Connecting)?;
        let session_id = st.session_id.clone();
        let token = self.renew_token();
        drop(st);

        info!(room_id, resumed, stream_active = cached.is_stream_active, "Entering room");

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SessionError::Stale),
            r = inner.transport.open(&room_id) => r,
        };

        let mut st = inner.state.lock().await;
        if st.session_id != session_id || st.state != SessionState::Connecting {
            if opened.is_ok() {
                inner.transport.destroy().await;
            }
            warn!(room_id, "Discarding transport opened for a finished session");
            return Err(SessionError::Stale);
        }

        match opened {
            Ok(transport_rx) => {
                let media_rx = lock(&inner.media_rx).take();
                pump::spawn(self.clone(), session_id, token, transport_rx, media_rx);
                Ok(room_id)
            }
            Err(e) => {
                let err = SessionError::from(e);
                warn!(room_id, error = %err, "Failed to open room");
                st.registry = None;
                st.resume_pending = false;
                st.room_id.clear();
                let _ = self.set_state(&mut st, SessionState::Idle);
                drop(st);

                let body = match &err {
                    SessionError::IdentityConflict(id) => {
                        format!("Room {id} is already being hosted")
                    }
                    other => other.to_string(),
                };
                self.notify(Notification::error("Could not start session", body));
                Err(err)
            }
        }
    }

    /// Share the screen with every connected viewer, `first` before the rest.
    pub async fn start_sharing(&self, first: Option<&str>) -> Result<(), SessionError> {
        self.share(first.map(str::to_string), true).await
    }

    /// Stop the screen capture. Viewers stay connected.
    pub async fn stop_sharing(&self) -> Result<(), SessionError> {
        let mut st = self.inner.state.lock().await;
        if st.state != SessionState::Streaming {
            return Err(SessionError::InvalidTransition {
                from: st.state.to_string(),
                to: SessionState::Open.to_string(),
            });
        }
        self.finish_capture(&mut st, "You stopped sharing your screen")
            .await;
        Ok(())
    }

    /// Open this room's audio call endpoint (`host-<room>`) on `transport`.
    /// A previous endpoint is ended first.
    pub async fn start_audio_call(
        &self,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<(CallEndpoint, mpsc::Receiver<SessionEvent>), SessionError> {
        let inner = &self.inner;
        let st = inner.state.lock().await;
        if st.state == SessionState::Ended {
            return Err(SessionError::SessionEnded);
        }
        let (endpoint, events) = CallEndpoint::new(
            &st.room_id,
            PeerRole::Host,
            transport,
            inner.devices.clone(),
            inner.cache.clone(),
            &inner.options,
        )?;

        let mut slot = inner.call.lock().await;
        if let Some(previous) = slot.take() {
            previous.end().await;
        }
        endpoint.open().await?;
        *slot = Some(endpoint.clone());
        info!(room_id = %st.room_id, "Audio call endpoint started");
        Ok((endpoint, events))
    }

    pub async fn end_audio_call(&self) {
        let endpoint = self.inner.call.lock().await.take();
        if let Some(endpoint) = endpoint {
            endpoint.end().await;
        }
    }

    /// Tear the session down: every link and call is closed, local media is
    /// stopped, and the room is forgotten. Later calls are no-ops.
    pub async fn end_session(&self) {
        let inner = &self.inner;
        self.token().cancel();

        let mut st = inner.state.lock().await;
        if st.state == SessionState::Ended {
            return;
        }
        let room_id = st.room_id.clone();
        let _ = self.set_state(&mut st, SessionState::Ended);
        st.resume_pending = false;

        let closed = match st.registry.take() {
            Some(mut registry) => registry.close_all().await,
            None => 0,
        };
        let call = inner.call.lock().await.take();
        if let Some(call) = call {
            call.end().await;
        }
        inner.media.release_all();
        inner.transport.destroy().await;
        if !room_id.is_empty() {
            inner.cache.clear(&room_id);
        }
        drop(st);

        info!(room_id, closed, "Session ended");
        self.emit(SessionEvent::SessionEnded {
            room_id: room_id.clone(),
        });
        self.notify(Notification::info(
            "Session ended",
            "Your screen sharing session has ended",
        ));
    }

    // -- internals ----------------------------------------------------------

    pub(super) fn token(&self) -> CancellationToken {
        lock(&self.inner.cancel).clone()
    }

    fn renew_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.inner.cancel) = token.clone();
        token
    }

    pub(super) fn set_state(
        &self,
        st: &mut HostState,
        next: SessionState,
    ) -> Result<(), SessionError> {
        let from = st.state.transition(next)?;
        self.inner.state_tx.send_replace(next);
        info!(room_id = %st.room_id, %from, to = %next, "Host state changed");
        self.emit(SessionEvent::StateChanged {
            room_id: st.room_id.clone(),
            role: PeerRole::Host,
            from,
            to: next,
        });
        Ok(())
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        publish(&self.inner.event_tx, event);
    }

    pub(super) fn notify(&self, notification: Notification) {
        self.emit(SessionEvent::Notify(notification));
    }

    /// Acquire the screen and broadcast it. `manual` is the operator's
    /// "start sharing"; otherwise this is a resume.
    ///
    /// Capture is acquired without the state lock. The result is dropped
    /// if the session changed meanwhile.
    pub(super) async fn share(&self, first: Option<String>, manual: bool) -> Result<(), SessionError> {
        let inner = &self.inner;
        let (session_id, token) = {
            let st = inner.state.lock().await;
            match st.state {
                SessionState::Open | SessionState::Streaming => {}
                SessionState::Ended => return Err(SessionError::SessionEnded),
                other => {
                    return Err(SessionError::InvalidTransition {
                        from: other.to_string(),
                        to: SessionState::Streaming.to_string(),
                    })
                }
            }
            if manual && st.registry.as_ref().map_or(true, |r| r.is_empty()) {
                drop(st);
                self.notify(Notification::warning(
                    "No viewers yet",
                    "Share the room code and start sharing once someone joins",
                ));
                return Err(SessionError::NoViewers);
            }
            (st.session_id.clone(), self.token())
        };

        let acquired = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SessionError::Stale),
            r = inner.media.acquire_display_media() => r,
        };

        let mut st = inner.state.lock().await;
        if st.session_id != session_id || !st.state.is_connected() {
            if let Ok(stream) = &acquired {
                inner.media.release_stream(stream);
            }
            warn!(room_id = %st.room_id, "Discarding capture acquired for a finished session");
            return Err(SessionError::Stale);
        }

        let stream = match acquired {
            Ok(stream) => stream,
            Err(e) => {
                warn!(room_id = %st.room_id, error = %e, "Screen capture failed");
                if st.resume_pending {
                    st.resume_pending = false;
                    let room_id = st.room_id.clone();
                    inner.cache.update(RoomUpdate::stream_active(false), &room_id);
                    self.emit(SessionEvent::StreamActiveChanged {
                        room_id,
                        active: false,
                    });
                }
                self.notify(Notification::error("Screen share failed", e.to_string()));
                return Err(e);
            }
        };
        st.resume_pending = false;

        let room_id = st.room_id.clone();
        let Some(registry) = st.registry.as_mut() else {
            return Err(SessionError::Stale);
        };
        let outcome = registry
            .broadcast(&inner.media, &stream, first.as_deref())
            .await;
        let total = registry.len();

        if manual && !outcome.reached_any(total) {
            if st.state == SessionState::Open {
                inner.media.release_stream(&stream);
            }
            let err = if total == 0 {
                SessionError::NoViewers
            } else {
                SessionError::Transport("could not reach any viewer".into())
            };
            self.notify(Notification::error("Screen share failed", err.to_string()));
            return Err(err);
        }

        if st.state == SessionState::Open {
            inner.cache.update(RoomUpdate::stream_active(true), &room_id);
            self.set_state(&mut st, SessionState::Streaming)?;
            self.emit(SessionEvent::StreamActiveChanged {
                room_id: room_id.clone(),
                active: true,
            });
            self.notify(Notification::success(
                "Screen sharing started",
                format!("Streaming to {total} viewer(s)"),
            ));
        }
        debug!(room_id, attached = outcome.attached.len(), "Share finished");
        Ok(())
    }

    /// Release the screen, close the calls that carried it, and fall back
    /// to `Open`. Links stay registered.
    pub(super) async fn finish_capture(&self, st: &mut HostState, reason: &str) {
        let inner = &self.inner;
        if let Some(stream) = inner.media.release_screen() {
            if let Some(registry) = st.registry.as_mut() {
                let closed = registry.detach_stream(stream.id()).await;
                debug!(room_id = %st.room_id, closed, "Closed calls carrying the capture");
            }
        }
        st.resume_pending = false;
        if st.state != SessionState::Streaming {
            return;
        }
        inner
            .cache
            .update(RoomUpdate::stream_active(false), &st.room_id);
        let _ = self.set_state(st, SessionState::Open);
        self.emit(SessionEvent::StreamActiveChanged {
            room_id: st.room_id.clone(),
            active: false,
        });
        self.notify(Notification::info("Screen sharing stopped", reason));
    }
}
