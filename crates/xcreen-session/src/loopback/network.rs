use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::media::MediaStream;
use crate::sync::lock;
use crate::transport::{DataLink, MediaCall, PeerTransport, TransportError, TransportEvent};

const DEFAULT_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NetState {
    peers: HashMap<String, mpsc::Sender<TransportEvent>>,
    links: Vec<Arc<LinkShared>>,
    calls: Vec<Arc<CallShared>>,
}

/// A signaling namespace shared by in-process peers.
#[derive(Clone)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetState>>,
    buffer: usize,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetState::default())),
            buffer: buffer.max(1),
        }
    }

    /// A new client on this network. It has no id until `open`.
    pub fn peer(&self) -> Arc<LoopbackPeer> {
        Arc::new(LoopbackPeer {
            network: self.clone(),
            local_id: Mutex::new(None),
        })
    }

    /// Whether `id` is currently claimed by a live peer.
    pub fn is_claimed(&self, id: &str) -> bool {
        lock(&self.state)
            .peers
            .get(id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Open links, counted once per link.
    pub fn open_links(&self) -> usize {
        lock(&self.state).links.iter().filter(|l| !l.is_closed()).count()
    }

    /// Open calls, counted once per call.
    pub fn open_calls(&self) -> usize {
        lock(&self.state).calls.iter().filter(|c| !c.is_closed()).count()
    }

    fn sender(&self, id: &str) -> Option<mpsc::Sender<TransportEvent>> {
        lock(&self.state)
            .peers
            .get(id)
            .filter(|tx| !tx.is_closed())
            .cloned()
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Events go through `try_send`; a full or dropped receiver loses the event.
fn deliver(tx: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    let kind = event.kind();
    if let Err(e) = tx.try_send(event) {
        debug!(kind, error = %e, "Loopback event dropped");
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

struct Side {
    id: String,
    tx: mpsc::Sender<TransportEvent>,
}

struct LinkShared {
    dialer: Side,
    listener: Side,
    closed: AtomicBool,
}

impl LinkShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn involves(&self, id: &str) -> bool {
        self.dialer.id == id || self.listener.id == id
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        deliver(
            &self.dialer.tx,
            TransportEvent::LinkClosed {
                remote_id: self.listener.id.clone(),
            },
        );
        deliver(
            &self.listener.tx,
            TransportEvent::LinkClosed {
                remote_id: self.dialer.id.clone(),
            },
        );
    }
}

/// One end of a loopback link.
struct LinkEnd {
    shared: Arc<LinkShared>,
    dialer_side: bool,
}

impl std::fmt::Debug for LinkEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEnd")
            .field("remote_id", &self.remote_id())
            .field("open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl DataLink for LinkEnd {
    fn remote_id(&self) -> &str {
        if self.dialer_side {
            &self.shared.listener.id
        } else {
            &self.shared.dialer.id
        }
    }

    fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    async fn close(&self) {
        self.shared.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

struct CallShared {
    caller: Side,
    callee: Side,
    outgoing: MediaStream,
    answered: AtomicBool,
    closed: AtomicBool,
}

impl CallShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn involves(&self, id: &str) -> bool {
        self.caller.id == id || self.callee.id == id
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        deliver(
            &self.caller.tx,
            TransportEvent::CallClosed {
                remote_id: self.callee.id.clone(),
            },
        );
        deliver(
            &self.callee.tx,
            TransportEvent::CallClosed {
                remote_id: self.caller.id.clone(),
            },
        );
    }
}

struct CallEnd {
    shared: Arc<CallShared>,
    caller_side: bool,
}

impl std::fmt::Debug for CallEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEnd")
            .field("remote_id", &self.remote_id())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

#[async_trait]
impl MediaCall for CallEnd {
    fn remote_id(&self) -> &str {
        if self.caller_side {
            &self.shared.callee.id
        } else {
            &self.shared.caller.id
        }
    }

    async fn answer(&self, stream: Option<MediaStream>) {
        let shared = &self.shared;
        if self.caller_side || shared.is_closed() || shared.answered.swap(true, Ordering::AcqRel) {
            return;
        }
        deliver(
            &shared.callee.tx,
            TransportEvent::RemoteStream {
                remote_id: shared.caller.id.clone(),
                stream: shared.outgoing.mirror(),
            },
        );
        if let Some(stream) = stream {
            deliver(
                &shared.caller.tx,
                TransportEvent::RemoteStream {
                    remote_id: shared.callee.id.clone(),
                    stream: stream.mirror(),
                },
            );
        }
    }

    async fn close(&self) {
        self.shared.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A client on a [`LoopbackNetwork`].
pub struct LoopbackPeer {
    network: LoopbackNetwork,
    local_id: Mutex<Option<String>>,
}

impl LoopbackPeer {
    pub fn local_id(&self) -> Option<String> {
        lock(&self.local_id).clone()
    }

    fn local(&self) -> Result<Side, TransportError> {
        let id = self.local_id().ok_or(TransportError::NotOpen)?;
        let tx = self.network.sender(&id).ok_or(TransportError::NotOpen)?;
        Ok(Side { id, tx })
    }

    fn remote(&self, remote_id: &str) -> Result<Side, TransportError> {
        let tx = self
            .network
            .sender(remote_id)
            .ok_or_else(|| TransportError::PeerUnavailable(remote_id.to_string()))?;
        Ok(Side {
            id: remote_id.to_string(),
            tx,
        })
    }

    fn release(&self, id: &str) {
        let (links, calls) = {
            let mut state = lock(&self.network.state);
            state.peers.remove(id);
            let links: Vec<_> = state.links.iter().filter(|l| l.involves(id)).cloned().collect();
            let calls: Vec<_> = state.calls.iter().filter(|c| c.involves(id)).cloned().collect();
            state.links.retain(|l| !l.involves(id));
            state.calls.retain(|c| !c.involves(id));
            (links, calls)
        };
        for call in calls {
            call.shutdown();
        }
        for link in links {
            link.shutdown();
        }
    }
}

#[async_trait]
impl PeerTransport for LoopbackPeer {
    async fn open(&self, local_id: &str) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(self.network.buffer);
        {
            let mut state = lock(&self.network.state);
            if state.peers.get(local_id).is_some_and(|existing| !existing.is_closed()) {
                return Err(TransportError::IdUnavailable(local_id.to_string()));
            }
            state.peers.insert(local_id.to_string(), tx.clone());
        }
        let previous = lock(&self.local_id).replace(local_id.to_string());
        if let Some(previous) = previous.filter(|p| p != local_id) {
            self.release(&previous);
        }
        deliver(
            &tx,
            TransportEvent::Open {
                local_id: local_id.to_string(),
            },
        );
        debug!(local_id, "Loopback peer open");
        Ok(rx)
    }

    async fn connect(&self, remote_id: &str) -> Result<Arc<dyn DataLink>, TransportError> {
        let dialer = self.local()?;
        let listener = self.remote(remote_id)?;
        let shared = Arc::new(LinkShared {
            dialer,
            listener,
            closed: AtomicBool::new(false),
        });
        lock(&self.network.state).links.push(shared.clone());

        let listener_end: Arc<dyn DataLink> = Arc::new(LinkEnd {
            shared: shared.clone(),
            dialer_side: false,
        });
        deliver(
            &shared.listener.tx,
            TransportEvent::Connection { link: listener_end },
        );
        deliver(
            &shared.dialer.tx,
            TransportEvent::LinkOpen {
                remote_id: remote_id.to_string(),
            },
        );
        Ok(Arc::new(LinkEnd {
            shared,
            dialer_side: true,
        }))
    }

    async fn call(
        &self,
        remote_id: &str,
        stream: &MediaStream,
    ) -> Result<Arc<dyn MediaCall>, TransportError> {
        let caller = self.local()?;
        let callee = self.remote(remote_id)?;
        let shared = Arc::new(CallShared {
            caller,
            callee,
            outgoing: stream.clone(),
            answered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        lock(&self.network.state).calls.push(shared.clone());

        let callee_end: Arc<dyn MediaCall> = Arc::new(CallEnd {
            shared: shared.clone(),
            caller_side: false,
        });
        deliver(&shared.callee.tx, TransportEvent::Call { call: callee_end });
        Ok(Arc::new(CallEnd {
            shared,
            caller_side: true,
        }))
    }

    async fn destroy(&self) {
        let Some(id) = lock(&self.local_id).take() else {
            return;
        };
        self.release(&id);
        debug!(local_id = %id, "Loopback peer destroyed");
    }
}

impl Drop for LoopbackPeer {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.local_id).take() {
            debug!(local_id = %id, "Loopback peer dropped without destroy");
            self.release(&id);
        }
    }
}
