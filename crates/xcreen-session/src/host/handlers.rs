//! Transport and media event handlers for the host.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use xcreen_common::{Notification, SessionId};

use crate::events::SessionEvent;
use crate::media::MediaSignal;
use crate::pump::{Dispatch, Input};
use crate::room_cache::RoomUpdate;
use crate::state::SessionState;
use crate::transport::{DataLink, TransportEvent};

use super::manager::HostSession;
use super::types::HostState;

#[async_trait]
impl Dispatch for HostSession {
    async fn dispatch(&self, session_id: &SessionId, input: Input) {
        let mut st = self.inner.state.lock().await;
        if st.session_id != *session_id || st.state == SessionState::Ended {
            warn!(room_id = %st.room_id, ?input, "Discarding stale event");
            return;
        }
        match input {
            Input::Transport(event) => {
                debug!(room_id = %st.room_id, kind = event.kind(), "Host event");
                self.on_transport(&mut st, event).await;
            }
            Input::Media(MediaSignal::CaptureEnded { stream_id }) => {
                self.on_capture_ended(&mut st, &stream_id).await;
            }
        }
    }
}

impl HostSession {
    async fn on_transport(&self, st: &mut HostState, event: TransportEvent) {
        match event {
            TransportEvent::Open { .. } => self.on_open(st).await,
            TransportEvent::Connection { link } => self.on_connection(st, link).await,
            TransportEvent::LinkClosed { remote_id } => self.on_link_closed(st, &remote_id).await,
            TransportEvent::Call { call } => {
                // viewers never call the screen-share identity
                debug!(remote_id = call.remote_id(), "Rejecting inbound call");
                call.close().await;
            }
            TransportEvent::Error { message } => {
                warn!(room_id = %st.room_id, error = %message, "Transport error");
                self.notify(Notification::error("Connection error", message));
            }
            TransportEvent::LinkOpen { .. }
            | TransportEvent::RemoteStream { .. }
            | TransportEvent::CallClosed { .. } => {}
        }
    }

    async fn on_open(&self, st: &mut HostState) {
        if st.state != SessionState::Connecting {
            return;
        }
        let viewers = st.registry.as_ref().map_or(0, |r| r.len());
        self.inner.cache.initialize(&st.room_id);
        self.inner
            .cache
            .update(RoomUpdate::viewers(viewers), &st.room_id);
        if self.set_state(st, SessionState::Open).is_err() {
            return;
        }
        info!(room_id = %st.room_id, resume = st.resume_pending, "Room open");

        self.notify(Notification::success(
            "Room ready",
            format!("Share the room code {} with your viewers", st.room_id),
        ));

        if st.resume_pending {
            let session = self.clone();
            tokio::spawn(async move {
                if let Err(e) = session.share(None, false).await {
                    debug!(error = %e, "Resumed stream not restarted");
                }
            });
        }
    }

    async fn on_connection(&self, st: &mut HostState, link: Arc<dyn DataLink>) {
        let inner = &self.inner;
        let room_id = st.room_id.clone();
        let remote_id = link.remote_id().to_string();
        let reconnecting = st.state == SessionState::Streaming || st.resume_pending;

        let registry = match st.registry.as_mut() {
            Some(registry) if st.state.is_connected() => registry,
            _ => {
                debug!(remote_id, state = %st.state, "Refusing connection");
                link.close().await;
                return;
            }
        };
        if let Some(replaced) = registry.add(link) {
            replaced.close().await;
        }
        let count = registry.len();

        self.emit(SessionEvent::ViewerCountChanged {
            room_id: room_id.clone(),
            count,
        });
        self.emit(SessionEvent::ViewerConnected {
            room_id,
            remote_id: remote_id.clone(),
        });

        if !reconnecting {
            self.notify(
                Notification::info("New viewer connected", "Click to start sharing your screen")
                    .with_action("Start Sharing"),
            );
            return;
        }

        self.notify(Notification::info("Reconnecting stream...", ""));
        // a pending resume broadcasts to this link once capture is back
        if let Some(stream) = inner.media.screen() {
            registry.attach_to(&inner.media, &stream, &remote_id).await;
        }
    }

    async fn on_link_closed(&self, st: &mut HostState, remote_id: &str) {
        let room_id = st.room_id.clone();
        let Some(registry) = st.registry.as_mut() else {
            return;
        };
        match registry.get_mut(remote_id) {
            None => return,
            // close of a link that was since replaced
            Some(entry) if entry.link().is_open() => return,
            Some(_) => {}
        }
        if let Some(link) = registry.remove(remote_id) {
            link.close().await;
        }
        let count = registry.len();

        self.emit(SessionEvent::ViewerCountChanged {
            room_id: room_id.clone(),
            count,
        });
        self.emit(SessionEvent::ViewerLeft {
            room_id,
            remote_id: remote_id.to_string(),
        });

        if count == 0 && st.state == SessionState::Streaming {
            self.finish_capture(st, "All viewers have left").await;
        }
    }

    async fn on_capture_ended(&self, st: &mut HostState, stream_id: &str) {
        if !self.inner.media.holds_screen(stream_id) {
            return;
        }
        info!(room_id = %st.room_id, stream_id, "Screen capture ended");
        self.finish_capture(st, "Screen capture ended").await;
    }
}
