use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use xcreen_common::SessionId;

use crate::call::CallEndpoint;
use crate::events::SessionEvent;
use crate::media::{MediaController, MediaDevices, MediaSignal};
use crate::options::SessionOptions;
use crate::registry::ConnectionRegistry;
use crate::room_cache::RoomCache;
use crate::state::SessionState;
use crate::transport::PeerTransport;

/// Everything guarded by the host's state lock. Registry mutations and
/// the cache writes they cause happen under it together.
pub(super) struct HostState {
    pub state: SessionState,
    pub session_id: SessionId,
    pub room_id: String,
    pub registry: Option<ConnectionRegistry>,
    /// The cached room was streaming and capture has not been reacquired yet.
    pub resume_pending: bool,
}

pub(super) struct HostInner {
    pub options: SessionOptions,
    pub cache: RoomCache,
    pub transport: Arc<dyn PeerTransport>,
    pub devices: Arc<dyn MediaDevices>,
    pub media: MediaController,
    pub state: tokio::sync::Mutex<HostState>,
    /// Cancels in-flight work of the current session. Kept outside the
    /// state lock so teardown can fire it while a handler holds the lock.
    pub cancel: Mutex<CancellationToken>,
    pub media_rx: Mutex<Option<mpsc::Receiver<MediaSignal>>>,
    pub call: tokio::sync::Mutex<Option<CallEndpoint>>,
    pub event_tx: mpsc::Sender<SessionEvent>,
    pub state_tx: watch::Sender<SessionState>,
}
