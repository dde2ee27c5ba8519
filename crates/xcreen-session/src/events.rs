use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use xcreen_common::Notification;

use crate::identity::PeerRole;
use crate::media::MediaStream;
use crate::state::{CallState, SessionState};

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        room_id: String,
        role: PeerRole,
        from: SessionState,
        to: SessionState,
    },
    ViewerCountChanged {
        room_id: String,
        count: usize,
    },
    StreamActiveChanged {
        room_id: String,
        active: bool,
    },
    ViewerConnected {
        room_id: String,
        remote_id: String,
    },
    ViewerLeft {
        room_id: String,
        remote_id: String,
    },
    /// Media from a remote peer, ready for playback.
    RemoteStream {
        room_id: String,
        remote_id: String,
        stream: MediaStream,
    },
    CallStateChanged {
        room_id: String,
        from: CallState,
        to: CallState,
    },
    Notify(Notification),
    SessionEnded {
        room_id: String,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::ViewerCountChanged { .. } => "viewer_count_changed",
            Self::StreamActiveChanged { .. } => "stream_active_changed",
            Self::ViewerConnected { .. } => "viewer_connected",
            Self::ViewerLeft { .. } => "viewer_left",
            Self::RemoteStream { .. } => "remote_stream",
            Self::CallStateChanged { .. } => "call_state_changed",
            Self::Notify(_) => "notify",
            Self::SessionEnded { .. } => "session_ended",
        }
    }
}

/// Hand an event to the presentation layer without waiting.
///
/// State machines publish while holding their state lock, so a reader that
/// stops draining must not stall them. When the channel is full the event
/// is dropped and logged; current state stays readable through the state
/// watch.
pub(crate) fn publish(tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!(kind = event.kind(), "Event channel full, dropping event");
        }
        // receiver gone: nobody is rendering this session
        Err(TrySendError::Closed(_)) => {}
    }
}
