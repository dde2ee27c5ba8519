use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xcreen_common::{Notification, SessionError, SessionId};

use crate::events::{publish, SessionEvent};
use crate::identity::{call_peer_id, PeerRole};
use crate::media::{MediaController, MediaDevices, MediaSignal};
use crate::options::SessionOptions;
use crate::pump::{self, Dispatch, Input};
use crate::room_cache::RoomCache;
use crate::state::CallState;
use crate::sync::lock;
use crate::transport::{MediaCall, PeerTransport, TransportEvent};

struct CallSlot {
    state: CallState,
    /// Transport identity is claimed and reachable.
    ready: bool,
    call: Option<Arc<dyn MediaCall>>,
    muted: bool,
}

struct CallInner {
    room_id: String,
    role: PeerRole,
    local_id: String,
    session_id: SessionId,
    cache: RoomCache,
    transport: Arc<dyn PeerTransport>,
    media: MediaController,
    slot: tokio::sync::Mutex<CallSlot>,
    cancel: CancellationToken,
    media_rx: Mutex<Option<mpsc::Receiver<MediaSignal>>>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<CallState>,
}

/// One side of a room's audio call. Clones share the same endpoint.
#[derive(Clone)]
pub struct CallEndpoint {
    inner: Arc<CallInner>,
}

impl CallEndpoint {
    pub fn new(
        room_id: &str,
        role: PeerRole,
        transport: Arc<dyn PeerTransport>,
        devices: Arc<dyn MediaDevices>,
        cache: RoomCache,
        options: &SessionOptions,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(SessionError::InvalidRoomCode);
        }
        let (event_tx, event_rx) = mpsc::channel(options.event_buffer.max(1));
        let (media, media_rx) =
            MediaController::new(devices, transport.clone(), options.event_buffer);
        let (state_tx, _) = watch::channel(CallState::Idle);

        let endpoint = Self {
            inner: Arc::new(CallInner {
                room_id: room_id.to_string(),
                role,
                local_id: call_peer_id(room_id, role),
                session_id: SessionId::new(),
                cache,
                transport,
                media,
                slot: tokio::sync::Mutex::new(CallSlot {
                    state: CallState::Idle,
                    ready: false,
                    call: None,
                    muted: false,
                }),
                cancel: CancellationToken::new(),
                media_rx: Mutex::new(Some(media_rx)),
                event_tx,
                state_tx,
            }),
        };
        Ok((endpoint, event_rx))
    }

    pub fn room_id(&self) -> &str {
        &self.inner.room_id
    }

    pub fn role(&self) -> PeerRole {
        self.inner.role
    }

    /// `host-<room>` or `participant-<room>`.
    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    /// The id a participant dials.
    pub fn remote_id(&self) -> Option<String> {
        match self.inner.role {
            PeerRole::Host => None,
            PeerRole::Participant => Some(call_peer_id(&self.inner.room_id, PeerRole::Host)),
        }
    }

    pub fn state(&self) -> CallState {
        *self.inner.state_tx.borrow()
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.slot.lock().await.ready
    }

    pub async fn is_muted(&self) -> bool {
        self.inner.slot.lock().await.muted
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CallState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the call reaches `target`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, target: CallState, timeout: Duration) -> bool {
        let mut rx = self.subscribe_state();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Register the room and claim this endpoint's transport identity.
    pub async fn open(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        if self.state() == CallState::Ended {
            return Err(SessionError::SessionEnded);
        }
        inner.cache.initialize(&inner.room_id);

        let opened = tokio::select! {
            _ = inner.cancel.cancelled() => return Err(SessionError::Stale),
            r = inner.transport.open(&inner.local_id) => r,
        };
        let transport_rx = match opened {
            Ok(rx) => rx,
            Err(e) => {
                warn!(room_id = %inner.room_id, local_id = %inner.local_id, error = %e, "Call endpoint failed to open");
                self.notify(Notification::error("Connection error", e.to_string()));
                return Err(e.into());
            }
        };
        if inner.cancel.is_cancelled() {
            inner.transport.destroy().await;
            return Err(SessionError::Stale);
        }

        let media_rx = lock(&inner.media_rx).take();
        pump::spawn(
            self.clone(),
            inner.session_id.clone(),
            inner.cancel.clone(),
            transport_rx,
            media_rx,
        );
        info!(room_id = %inner.room_id, local_id = %inner.local_id, "Call endpoint opened");
        Ok(())
    }

    /// Call the host with the local microphone. Participant only.
    pub async fn dial(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let Some(remote_id) = self.remote_id() else {
            return Err(SessionError::InvalidTransition {
                from: "host".into(),
                to: CallState::Connecting.to_string(),
            });
        };

        let mut slot = inner.slot.lock().await;
        if !slot.ready {
            return Err(SessionError::Transport("call endpoint is not ready".into()));
        }
        self.set_state(&mut slot, CallState::Connecting)?;

        let microphone = tokio::select! {
            _ = inner.cancel.cancelled() => return Err(SessionError::Stale),
            r = inner.media.acquire_microphone() => r,
        };
        let microphone = match microphone {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_connecting(&mut slot, "Could not access microphone");
                return Err(e);
            }
        };
        microphone.set_audio_enabled(!slot.muted);

        match inner.media.start_call(&microphone, &remote_id).await {
            Ok(call) => {
                slot.call = Some(call);
                self.set_state(&mut slot, CallState::Active)?;
                info!(room_id = %inner.room_id, remote_id, "Audio call started");
                Ok(())
            }
            Err(e) => {
                inner.media.release_microphone();
                self.fail_connecting(&mut slot, "Call error occurred");
                Err(e)
            }
        }
    }

    /// Enable or disable the microphone's audio tracks. Returns `false`
    /// when no microphone is held.
    pub async fn set_muted(&self, muted: bool) -> bool {
        let mut slot = self.inner.slot.lock().await;
        slot.muted = muted;
        let Some(microphone) = self.inner.media.microphone() else {
            return false;
        };
        microphone.set_audio_enabled(!muted);
        drop(slot);

        let title = if muted { "Microphone muted" } else { "Microphone unmuted" };
        self.notify(Notification::success(title, ""));
        true
    }

    /// Close the call, stop the microphone, and release the transport
    /// identity. Later calls are no-ops.
    pub async fn end(&self) {
        let inner = &self.inner;
        inner.cancel.cancel();

        let mut slot = inner.slot.lock().await;
        if slot.state == CallState::Ended {
            return;
        }
        if let Some(call) = slot.call.take() {
            call.close().await;
        }
        inner.media.release_all();
        inner.transport.destroy().await;
        slot.ready = false;
        let _ = self.set_state(&mut slot, CallState::Ended);
        info!(room_id = %inner.room_id, local_id = %inner.local_id, "Call endpoint ended");
    }

    fn set_state(&self, slot: &mut CallSlot, next: CallState) -> Result<(), SessionError> {
        let from = slot.state.transition(next)?;
        self.inner.state_tx.send_replace(next);
        self.emit(SessionEvent::CallStateChanged {
            room_id: self.inner.room_id.clone(),
            from,
            to: next,
        });
        Ok(())
    }

    fn fail_connecting(&self, slot: &mut CallSlot, title: &str) {
        let _ = self.set_state(slot, CallState::Idle);
        self.notify(Notification::error(title, ""));
    }

    fn emit(&self, event: SessionEvent) {
        publish(&self.inner.event_tx, event);
    }

    fn notify(&self, notification: Notification) {
        self.emit(SessionEvent::Notify(notification));
    }

    // -- handlers -----------------------------------------------------------

    async fn on_inbound_call(&self, call: Arc<dyn MediaCall>) {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;
        if inner.role != PeerRole::Host || slot.state != CallState::Idle {
            debug!(remote_id = call.remote_id(), state = %slot.state, "Rejecting inbound call");
            call.close().await;
            return;
        }
        if self.set_state(&mut slot, CallState::Connecting).is_err() {
            return;
        }

        let answered = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            r = inner.media.attach_incoming(&call) => r,
        };
        match answered {
            Ok(microphone) => {
                microphone.set_audio_enabled(!slot.muted);
                slot.call = Some(call);
                let _ = self.set_state(&mut slot, CallState::Active);
                self.notify(Notification::success("Participant connected to audio call", ""));
            }
            Err(e) => {
                warn!(room_id = %inner.room_id, error = %e, "Could not answer audio call");
                call.close().await;
                self.fail_connecting(&mut slot, "Could not access microphone");
            }
        }
    }

    async fn on_call_closed(&self, remote_id: &str) {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;
        let ours = slot.call.as_ref().is_some_and(|c| c.remote_id() == remote_id);
        if !ours || slot.state != CallState::Active {
            return;
        }
        slot.call = None;
        inner.media.release_microphone();
        let _ = self.set_state(&mut slot, CallState::Idle);
        info!(room_id = %inner.room_id, remote_id, "Audio call closed by peer");
    }
}

#[async_trait]
impl Dispatch for CallEndpoint {
    async fn dispatch(&self, session_id: &SessionId, input: Input) {
        if *session_id != self.inner.session_id || self.state() == CallState::Ended {
            return;
        }
        let Input::Transport(event) = input else {
            // microphone end is not tracked by the call
            return;
        };
        debug!(room_id = %self.inner.room_id, kind = event.kind(), "Call endpoint event");
        match event {
            TransportEvent::Open { .. } => {
                self.inner.slot.lock().await.ready = true;
                self.notify(Notification::success("Audio connection ready", ""));
            }
            TransportEvent::Call { call } => self.on_inbound_call(call).await,
            TransportEvent::RemoteStream { remote_id, stream } => {
                self.emit(SessionEvent::RemoteStream {
                    room_id: self.inner.room_id.clone(),
                    remote_id,
                    stream,
                });
                let title = match self.inner.role {
                    PeerRole::Host => "Participant joined audio call",
                    PeerRole::Participant => "Connected to host's audio",
                };
                self.notify(Notification::success(title, ""));
            }
            TransportEvent::CallClosed { remote_id } => self.on_call_closed(&remote_id).await,
            TransportEvent::Error { message } => {
                warn!(room_id = %self.inner.room_id, error = %message, "Call transport error");
                self.notify(Notification::error("Connection error", message));
            }
            TransportEvent::Connection { link } => link.close().await,
            TransportEvent::LinkOpen { .. } | TransportEvent::LinkClosed { .. } => {}
        }
    }
}
