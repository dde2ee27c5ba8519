use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::SessionEvent;
use crate::loopback::LoopbackPeer;
use crate::media::MediaStream;
use crate::transport::{DataLink, MediaCall, PeerTransport, TransportError, TransportEvent};
use xcreen_common::Notification;

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Collect every event already queued, waiting briefly for stragglers.
pub async fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        events.push(event);
    }
    events
}

pub fn notifications(events: &[SessionEvent]) -> Vec<Notification> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Notify(n) => Some(n.clone()),
            _ => None,
        })
        .collect()
}

/// A data link that only counts closes.
#[derive(Debug)]
pub struct FakeLink {
    remote_id: String,
    open: AtomicBool,
    closes: AtomicUsize,
}

impl FakeLink {
    pub fn new(remote_id: &str) -> Arc<Self> {
        Arc::new(Self {
            remote_id: remote_id.to_string(),
            open: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        })
    }

    /// Times `close` actually closed the link.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataLink for FakeLink {
    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A media call that records answers and closes.
#[derive(Debug)]
pub struct FakeCall {
    remote_id: String,
    answered: AtomicUsize,
    closed: AtomicBool,
    closes: AtomicUsize,
}

impl FakeCall {
    pub fn new(remote_id: &str) -> Arc<Self> {
        Arc::new(Self {
            remote_id: remote_id.to_string(),
            answered: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn answer_count(&self) -> usize {
        self.answered.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaCall for FakeCall {
    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    async fn answer(&self, _stream: Option<MediaStream>) {
        self.answered.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A loopback peer whose `open` takes `delay`, either before claiming the
/// id or after.
pub struct SlowOpen {
    inner: Arc<LoopbackPeer>,
    delay: Duration,
    claim_first: bool,
}

impl SlowOpen {
    pub fn new(inner: Arc<LoopbackPeer>, delay: Duration, claim_first: bool) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay,
            claim_first,
        })
    }
}

#[async_trait]
impl PeerTransport for SlowOpen {
    async fn open(&self, local_id: &str) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        if self.claim_first {
            let rx = self.inner.open(local_id).await?;
            tokio::time::sleep(self.delay).await;
            Ok(rx)
        } else {
            tokio::time::sleep(self.delay).await;
            self.inner.open(local_id).await
        }
    }

    async fn connect(&self, remote_id: &str) -> Result<Arc<dyn DataLink>, TransportError> {
        self.inner.connect(remote_id).await
    }

    async fn call(
        &self,
        remote_id: &str,
        stream: &MediaStream,
    ) -> Result<Arc<dyn MediaCall>, TransportError> {
        self.inner.call(remote_id, stream).await
    }

    async fn destroy(&self) {
        self.inner.destroy().await
    }
}
