use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xcreen_common::{Notification, SessionError, SessionId};

use crate::call::CallEndpoint;
use crate::events::{publish, SessionEvent};
use crate::identity::{Endpoint, PeerIdentity, PeerRole};
use crate::media::{MediaDevices, MediaStream};
use crate::options::SessionOptions;
use crate::pump::{self, Dispatch, Input};
use crate::room_cache::RoomCache;
use crate::state::SessionState;
use crate::sync::lock;
use crate::transport::{DataLink, MediaCall, PeerTransport, TransportEvent};

const CONNECT_FAILED: &str =
    "Could not connect to the room. Please check the room code and try again.";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

struct ParticipantState {
    state: SessionState,
    session_id: SessionId,
    room_id: String,
    link: Option<Arc<dyn DataLink>>,
    media_call: Option<Arc<dyn MediaCall>>,
    remote_stream: Option<MediaStream>,
}

struct ParticipantInner {
    options: SessionOptions,
    cache: RoomCache,
    transport: Arc<dyn PeerTransport>,
    devices: Arc<dyn MediaDevices>,
    identity: PeerIdentity,
    state: tokio::sync::Mutex<ParticipantState>,
    cancel: Mutex<CancellationToken>,
    call: tokio::sync::Mutex<Option<CallEndpoint>>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
}

// ---------------------------------------------------------------------------
// Participant Session
// ---------------------------------------------------------------------------

/// A viewer's state machine. Clones share the same session.
#[derive(Clone)]
pub struct ParticipantSession {
    inner: Arc<ParticipantInner>,
}

impl ParticipantSession {
    pub fn new(
        options: SessionOptions,
        cache: RoomCache,
        transport: Arc<dyn PeerTransport>,
        devices: Arc<dyn MediaDevices>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(options.event_buffer.max(1));
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let session = Self {
            inner: Arc::new(ParticipantInner {
                options,
                cache,
                transport,
                devices,
                identity: PeerIdentity::new(),
                state: tokio::sync::Mutex::new(ParticipantState {
                    state: SessionState::Idle,
                    session_id: SessionId::new(),
                    room_id: String::new(),
                    link: None,
                    media_call: None,
                    remote_stream: None,
                }),
                cancel: Mutex::new(CancellationToken::new()),
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

    pub async fn wait_for_state(&self, target: SessionState, timeout: Duration) -> bool {
        let mut rx = self.inner.state_tx.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// This participant's transport id.
    pub fn peer_id(&self) -> String {
        self.inner
            .identity
            .resolve("", PeerRole::Participant, Endpoint::Primary)
    }

    pub async fn room_id(&self) -> Option<String> {
        let st = self.inner.state.lock().await;
        (!st.room_id.is_empty()).then(|| st.room_id.clone())
    }

    /// The host's screen, while it is being received.
    pub async fn remote_stream(&self) -> Option<MediaStream> {
        self.inner.state.lock().await.remote_stream.clone()
    }

    /// Open the transport and dial the room. The session reaches `Open`
    /// once the host accepts the link.
    pub async fn join(&self, room: &str) -> Result<(), SessionError> {
        let inner = &self.inner;
        let room_id = room.trim().to_string();
        if room_id.is_empty() {
            self.notify(Notification::error("Room code required", "Please enter a room code"));
            return Err(SessionError::InvalidRoomCode);
        }

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
        st.session_id = SessionId::new();
        st.room_id = room_id.clone();
        self.set_state(&mut st, SessionState::Connecting)?;
        let session_id = st.session_id.clone();
        let token = CancellationToken::new();
        *lock(&inner.cancel) = token.clone();
        drop(st);

        let local_id = inner
            .identity
            .resolve(&room_id, PeerRole::Participant, Endpoint::Primary);
        info!(room_id, local_id, "Joining room");

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SessionError::Stale),
            r = inner.transport.open(&local_id) => r,
        };

        let mut st = inner.state.lock().await;
        if st.session_id != session_id || st.state != SessionState::Connecting {
            if opened.is_ok() {
                inner.transport.destroy().await;
            }
            return Err(SessionError::Stale);
        }
        match opened {
            Ok(transport_rx) => {
                pump::spawn(self.clone(), session_id, token, transport_rx, None);
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                self.fail_connect(&mut st, &err).await;
                Err(err)
            }
        }
    }

    /// Leave the room. Later calls are no-ops.
    pub async fn leave(&self) {
        lock(&self.inner.cancel).cancel();
        let mut st = self.inner.state.lock().await;
        if st.state == SessionState::Ended {
            return;
        }
        self.teardown(&mut st).await;
    }

    /// Open this room's audio call endpoint (`participant-<room>`). Dial the
    /// host with [`CallEndpoint::dial`] once it is ready.
    pub async fn start_audio_call(
        &self,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<(CallEndpoint, mpsc::Receiver<SessionEvent>), SessionError> {
        let inner = &self.inner;
        let st = inner.state.lock().await;
        if !st.state.is_connected() {
            return Err(SessionError::InvalidTransition {
                from: st.state.to_string(),
                to: "CallConnecting".into(),
            });
        }
        let (endpoint, events) = CallEndpoint::new(
            &st.room_id,
            PeerRole::Participant,
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
        Ok((endpoint, events))
    }

    pub async fn end_audio_call(&self) {
        let endpoint = self.inner.call.lock().await.take();
        if let Some(endpoint) = endpoint {
            endpoint.end().await;
        }
    }

    // -- internals ----------------------------------------------------------

    fn set_state(
        &self,
        st: &mut ParticipantState,
        next: SessionState,
    ) -> Result<(), SessionError> {
        let from = st.state.transition(next)?;
        self.inner.state_tx.send_replace(next);
        info!(room_id = %st.room_id, %from, to = %next, "Participant state changed");
        self.emit(SessionEvent::StateChanged {
            room_id: st.room_id.clone(),
            role: PeerRole::Participant,
            from,
            to: next,
        });
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        publish(&self.inner.event_tx, event);
    }

    fn notify(&self, notification: Notification) {
        self.emit(SessionEvent::Notify(notification));
    }

    /// Back to `Idle` after a failed join, releasing the transport id.
    async fn fail_connect(&self, st: &mut ParticipantState, err: &SessionError) {
        warn!(room_id = %st.room_id, error = %err, "Failed to join room");
        lock(&self.inner.cancel).cancel();
        if let Some(link) = st.link.take() {
            link.close().await;
        }
        self.inner.transport.destroy().await;
        let _ = self.set_state(st, SessionState::Idle);
        st.room_id.clear();
        self.notify(Notification::error("Connection failed", CONNECT_FAILED));
    }

    async fn teardown(&self, st: &mut ParticipantState) {
        let room_id = st.room_id.clone();
        let _ = self.set_state(st, SessionState::Ended);
        if let Some(call) = st.media_call.take() {
            call.close().await;
        }
        if let Some(link) = st.link.take() {
            link.close().await;
        }
        if let Some(stream) = st.remote_stream.take() {
            stream.stop();
        }
        let call = self.inner.call.lock().await.take();
        if let Some(call) = call {
            call.end().await;
        }
        self.inner.transport.destroy().await;
        info!(room_id, "Left room");
        self.emit(SessionEvent::SessionEnded { room_id });
    }

    // -- handlers -----------------------------------------------------------

    async fn on_open(&self, st: &mut ParticipantState) {
        if st.state != SessionState::Connecting || st.link.is_some() {
            return;
        }
        match self.inner.transport.connect(&st.room_id).await {
            Ok(link) => st.link = Some(link),
            Err(e) => self.fail_connect(st, &e.into()).await,
        }
    }

    async fn on_link_open(&self, st: &mut ParticipantState, remote_id: &str) {
        if remote_id != st.room_id || st.state != SessionState::Connecting {
            return;
        }
        if self.set_state(st, SessionState::Open).is_ok() {
            self.notify(Notification::success(
                "Connected!",
                "Waiting for host to share their screen...",
            ));
        }
    }

    async fn on_call(&self, st: &mut ParticipantState, call: Arc<dyn MediaCall>) {
        if call.remote_id() != st.room_id || !st.state.is_connected() {
            call.close().await;
            return;
        }
        // view-only: nothing is sent back
        call.answer(None).await;
        if let Some(previous) = st.media_call.replace(call) {
            previous.close().await;
        }
    }

    async fn on_remote_stream(&self, st: &mut ParticipantState, remote_id: String, stream: MediaStream) {
        if remote_id != st.room_id || !st.state.is_connected() {
            return;
        }
        if let Some(previous) = st.remote_stream.replace(stream.clone()) {
            previous.stop();
        }
        if st.state == SessionState::Open {
            let _ = self.set_state(st, SessionState::Streaming);
            self.emit(SessionEvent::StreamActiveChanged {
                room_id: st.room_id.clone(),
                active: true,
            });
        }
        self.emit(SessionEvent::RemoteStream {
            room_id: st.room_id.clone(),
            remote_id,
            stream,
        });
    }

    async fn on_call_closed(&self, st: &mut ParticipantState, remote_id: &str) {
        if remote_id != st.room_id {
            return;
        }
        st.media_call = None;
        if let Some(stream) = st.remote_stream.take() {
            stream.stop();
        }
        if st.state == SessionState::Streaming {
            let _ = self.set_state(st, SessionState::Open);
            self.emit(SessionEvent::StreamActiveChanged {
                room_id: st.room_id.clone(),
                active: false,
            });
        }
    }

    async fn on_link_closed(&self, st: &mut ParticipantState, remote_id: &str) {
        if remote_id != st.room_id {
            return;
        }
        if st.state == SessionState::Connecting {
            self.fail_connect(st, &SessionError::Transport("link closed".into()))
                .await;
            return;
        }
        lock(&self.inner.cancel).cancel();
        self.notify(Notification::warning(
            "Disconnected",
            "The host has ended the session",
        ));
        self.teardown(st).await;
    }
}

#[async_trait]
impl Dispatch for ParticipantSession {
    async fn dispatch(&self, session_id: &SessionId, input: Input) {
        let mut st = self.inner.state.lock().await;
        if st.session_id != *session_id || st.state == SessionState::Ended {
            warn!(room_id = %st.room_id, ?input, "Discarding stale event");
            return;
        }
        let Input::Transport(event) = input else {
            return;
        };
        debug!(room_id = %st.room_id, kind = event.kind(), "Participant event");
        match event {
            TransportEvent::Open { .. } => self.on_open(&mut st).await,
            TransportEvent::LinkOpen { remote_id } => self.on_link_open(&mut st, &remote_id).await,
            TransportEvent::Call { call } => self.on_call(&mut st, call).await,
            TransportEvent::RemoteStream { remote_id, stream } => {
                self.on_remote_stream(&mut st, remote_id, stream).await
            }
            TransportEvent::CallClosed { remote_id } => self.on_call_closed(&mut st, &remote_id).await,
            TransportEvent::LinkClosed { remote_id } => self.on_link_closed(&mut st, &remote_id).await,
            TransportEvent::Connection { link } => {
                // participants are not dialed
                link.close().await;
            }
            TransportEvent::Error { message } => {
                if st.state == SessionState::Connecting {
                    self.fail_connect(&mut st, &SessionError::Transport(message))
                        .await;
                } else {
                    warn!(room_id = %st.room_id, error = %message, "Transport error");
                    self.notify(Notification::error("Connection error", message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSession;
    use crate::loopback::{LoopbackNetwork, SyntheticCapture};
    use crate::state::CallState;
    use crate::storage::MemoryStorage;
    use crate::test_support::{drain, notifications, wait_until};

    const WAIT: Duration = Duration::from_secs(2);

    struct Rig {
        network: LoopbackNetwork,
        capture: Arc<SyntheticCapture>,
        cache: RoomCache,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                network: LoopbackNetwork::new(),
                capture: Arc::new(SyntheticCapture::new()),
                cache: RoomCache::new(Arc::new(MemoryStorage::new()), Duration::from_secs(3600)),
            }
        }

        async fn host(&self, room: &str) -> (HostSession, mpsc::Receiver<SessionEvent>) {
            let (host, events) = HostSession::new(
                SessionOptions::default(),
                self.cache.clone(),
                self.network.peer(),
                self.capture.clone(),
            );
            host.enter(Some(room)).await.unwrap();
            assert!(host.wait_for_state(SessionState::Open, WAIT).await);
            (host, events)
        }

        async fn host_sees(&self, host: &HostSession, viewers: usize) -> bool {
            wait_until(|| async move { host.viewer_count().await == viewers }).await
        }

        fn participant(&self) -> (ParticipantSession, mpsc::Receiver<SessionEvent>) {
            ParticipantSession::new(
                SessionOptions::default(),
                self.cache.clone(),
                self.network.peer(),
                Arc::new(SyntheticCapture::new()),
            )
        }
    }

    fn titles(events: &[SessionEvent]) -> Vec<String> {
        notifications(events).into_iter().map(|n| n.title).collect()
    }

    #[tokio::test]
    async fn blank_code_is_rejected() {
        let rig = Rig::new();
        let (viewer, mut events) = rig.participant();
        assert_eq!(viewer.join("   ").await, Err(SessionError::InvalidRoomCode));
        assert_eq!(viewer.state(), SessionState::Idle);
        assert_eq!(titles(&drain(&mut events).await), vec!["Room code required".to_string()]);
    }

    #[tokio::test]
    async fn unknown_room_returns_to_idle() {
        let rig = Rig::new();
        let (viewer, mut events) = rig.participant();
        viewer.join("nothere").await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Idle, WAIT).await);

        let seen = drain(&mut events).await;
        let failure = notifications(&seen)
            .into_iter()
            .find(|n| n.title == "Connection failed")
            .unwrap();
        assert_eq!(failure.body, CONNECT_FAILED);
        assert!(viewer.room_id().await.is_none());
        assert!(!rig.network.is_claimed(&viewer.peer_id()));

        // a later attempt can succeed
        let (_host, _host_events) = rig.host("nothere").await;
        viewer.join("nothere").await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Open, WAIT).await);
    }

    #[tokio::test]
    async fn watches_the_host_share() {
        let rig = Rig::new();
        let (host, _host_events) = rig.host("abc123").await;
        let (viewer, mut events) = rig.participant();

        viewer.join("abc123").await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Open, WAIT).await);
        assert!(titles(&drain(&mut events).await).contains(&"Connected!".to_string()));
        assert!(rig.host_sees(&host, 1).await);
        assert_eq!(host.viewers().await, vec![viewer.peer_id()]);

        host.start_sharing(None).await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Streaming, WAIT).await);
        let stream = viewer.remote_stream().await.unwrap();
        assert_eq!(stream.video_tracks().len(), 1);
        assert!(drain(&mut events)
            .await
            .iter()
            .any(|e| matches!(e, SessionEvent::RemoteStream { remote_id, .. } if remote_id == "abc123")));

        host.stop_sharing().await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Open, WAIT).await);
        assert!(viewer.remote_stream().await.is_none());
    }

    #[tokio::test]
    async fn host_ending_disconnects_viewer() {
        let rig = Rig::new();
        let (host, _host_events) = rig.host("abc123").await;
        let (viewer, mut events) = rig.participant();
        viewer.join("abc123").await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Open, WAIT).await);

        host.end_session().await;
        assert!(viewer.wait_for_state(SessionState::Ended, WAIT).await);
        let seen = drain(&mut events).await;
        let notice = notifications(&seen)
            .into_iter()
            .find(|n| n.title == "Disconnected")
            .unwrap();
        assert_eq!(notice.body, "The host has ended the session");
        assert!(seen.iter().any(|e| matches!(e, SessionEvent::SessionEnded { .. })));
        assert_eq!(viewer.join("abc123").await, Err(SessionError::SessionEnded));
    }

    #[tokio::test]
    async fn leaving_updates_host_viewer_count() {
        let rig = Rig::new();
        let (host, _host_events) = rig.host("abc123").await;
        let (viewer, _events) = rig.participant();
        viewer.join("abc123").await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Open, WAIT).await);
        assert!(rig.host_sees(&host, 1).await);

        viewer.leave().await;
        viewer.leave().await;
        assert_eq!(viewer.state(), SessionState::Ended);
        assert!(rig.host_sees(&host, 0).await);
        assert_eq!(rig.cache.get(Some("abc123")).viewer_count, 0);
        assert_eq!(host.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn audio_call_alongside_screen_share() {
        let rig = Rig::new();
        let (host, _host_events) = rig.host("abc123").await;
        let (viewer, _events) = rig.participant();
        viewer.join("abc123").await.unwrap();
        assert!(viewer.wait_for_state(SessionState::Open, WAIT).await);
        assert!(rig.host_sees(&host, 1).await);
        host.start_sharing(None).await.unwrap();

        let (host_call, _host_call_events) = host.start_audio_call(rig.network.peer()).await.unwrap();
        let (guest_call, _guest_call_events) =
            viewer.start_audio_call(rig.network.peer()).await.unwrap();
        let guest_ref = &guest_call;
        assert!(wait_until(|| async move { guest_ref.is_ready().await }).await);

        guest_call.dial().await.unwrap();
        assert!(host_call.wait_for_state(CallState::Active, WAIT).await);
        assert_eq!(host.state(), SessionState::Streaming);

        viewer.leave().await;
        assert_eq!(guest_call.state(), CallState::Ended);
        assert!(host_call.wait_for_state(CallState::Idle, WAIT).await);
    }

    #[tokio::test]
    async fn audio_call_needs_a_room() {
        let rig = Rig::new();
        let (viewer, _events) = rig.participant();
        assert!(viewer.start_audio_call(rig.network.peer()).await.is_err());
    }
}
