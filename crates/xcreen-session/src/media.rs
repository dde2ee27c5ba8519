//! Local media streams and the controller that attaches them to calls.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use xcreen_common::{new_id, SessionError};

use crate::registry::PeerLink;
use crate::sync::lock;
use crate::transport::{MediaCall, PeerTransport};

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    live: AtomicBool,
}

/// One audio or video track of a stream.
#[derive(Debug, Clone)]
pub struct MediaTrack(Arc<TrackInner>);

impl MediaTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self(Arc::new(TrackInner {
            id: new_id(),
            kind,
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn kind(&self) -> TrackKind {
        self.0.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.0.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.0.live.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.0.live.store(false, Ordering::Release);
    }
}

/// Where a stream came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Screen,
    Microphone,
    /// Received from a remote peer.
    Remote,
}

struct StreamInner {
    id: String,
    kind: StreamKind,
    tracks: Vec<MediaTrack>,
    ended: watch::Sender<bool>,
}

/// Cheap-clone handle to a media stream. Clones share tracks and the
/// `ended` signal.
#[derive(Clone)]
pub struct MediaStream(Arc<StreamInner>);

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("tracks", &self.0.tracks.len())
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl MediaStream {
    pub fn new(kind: StreamKind, tracks: Vec<MediaTrack>) -> Self {
        let (ended, _) = watch::channel(false);
        Self(Arc::new(StreamInner {
            id: new_id(),
            kind,
            tracks,
            ended,
        }))
    }

    /// A screen capture with a single video track.
    pub fn screen() -> Self {
        Self::new(StreamKind::Screen, vec![MediaTrack::new(TrackKind::Video)])
    }

    /// A microphone capture with a single audio track.
    pub fn microphone() -> Self {
        Self::new(StreamKind::Microphone, vec![MediaTrack::new(TrackKind::Audio)])
    }

    /// The receiving side's view of this stream: same track layout, own
    /// lifecycle.
    pub fn mirror(&self) -> Self {
        let tracks = self.0.tracks.iter().map(|t| MediaTrack::new(t.kind())).collect();
        Self::new(StreamKind::Remote, tracks)
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn kind(&self) -> StreamKind {
        self.0.kind
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.0.tracks
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.0
            .tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// Stop every track and fire `ended`. Also what a capture source does
    /// when the user uses the platform's own "stop sharing" control.
    pub fn stop(&self) {
        for track in &self.0.tracks {
            track.stop();
        }
        self.0.ended.send_replace(true);
    }

    pub fn is_ended(&self) -> bool {
        *self.0.ended.borrow()
    }

    /// Resolves once the stream has ended.
    pub async fn ended(&self) {
        let mut rx = self.0.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    /// Enable or disable every audio track (mute).
    pub fn set_audio_enabled(&self, enabled: bool) {
        for track in self.audio_tracks() {
            track.set_enabled(enabled);
        }
    }

    pub fn same_as(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Capture collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no capture source available")]
    NoSource,

    #[error("{0}")]
    Other(String),
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        SessionError::MediaAcquisition(err.to_string())
    }
}

/// Platform capture APIs.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_display_media(&self) -> Result<MediaStream, MediaError>;

    async fn get_user_audio(&self) -> Result<MediaStream, MediaError>;
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Raised when a locally held stream ends on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSignal {
    CaptureEnded { stream_id: String },
}

/// Owns the locally acquired streams of one session and starts the calls
/// that carry them.
pub struct MediaController {
    devices: Arc<dyn MediaDevices>,
    transport: Arc<dyn PeerTransport>,
    screen: Mutex<Option<MediaStream>>,
    microphone: Mutex<Option<MediaStream>>,
    /// Stream ids with a live `ended` watcher.
    watched: Arc<Mutex<HashSet<String>>>,
    signal_tx: mpsc::Sender<MediaSignal>,
}

impl MediaController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        transport: Arc<dyn PeerTransport>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<MediaSignal>) {
        let (signal_tx, signal_rx) = mpsc::channel(buffer.max(1));
        let controller = Self {
            devices,
            transport,
            screen: Mutex::new(None),
            microphone: Mutex::new(None),
            watched: Arc::new(Mutex::new(HashSet::new())),
            signal_tx,
        };
        (controller, signal_rx)
    }

    /// The live screen stream, if any.
    pub fn screen(&self) -> Option<MediaStream> {
        lock(&self.screen).clone().filter(|s| !s.is_ended())
    }

    pub fn microphone(&self) -> Option<MediaStream> {
        lock(&self.microphone).clone().filter(|s| !s.is_ended())
    }

    /// Whether `stream_id` is the screen stream this controller holds,
    /// ended or not.
    pub fn holds_screen(&self, stream_id: &str) -> bool {
        lock(&self.screen).as_ref().is_some_and(|s| s.id() == stream_id)
    }

    pub fn holds_microphone(&self, stream_id: &str) -> bool {
        lock(&self.microphone)
            .as_ref()
            .is_some_and(|s| s.id() == stream_id)
    }

    /// Returns the session's screen stream, prompting the capture source
    /// only when no live one is held.
    pub async fn acquire_display_media(&self) -> Result<MediaStream, SessionError> {
        if let Some(stream) = self.screen() {
            return Ok(stream);
        }
        let stream = self.devices.get_display_media().await?;
        let stream = Self::install(&self.screen, stream);
        self.watch_ended(&stream);
        info!(stream_id = stream.id(), "Screen capture acquired");
        Ok(stream)
    }

    /// Microphone stream, independent of the screen stream.
    pub async fn acquire_microphone(&self) -> Result<MediaStream, SessionError> {
        if let Some(stream) = self.microphone() {
            return Ok(stream);
        }
        let stream = self.devices.get_user_audio().await?;
        let stream = Self::install(&self.microphone, stream);
        self.watch_ended(&stream);
        info!(stream_id = stream.id(), "Microphone acquired");
        Ok(stream)
    }

    /// Keep one live stream per slot. A capture that lost the race is
    /// stopped and the winner returned.
    fn install(slot: &Mutex<Option<MediaStream>>, stream: MediaStream) -> MediaStream {
        let mut slot = lock(slot);
        if let Some(existing) = slot.as_ref().filter(|s| !s.is_ended()) {
            stream.stop();
            return existing.clone();
        }
        *slot = Some(stream.clone());
        stream
    }

    /// Call `remote_id` carrying `stream`.
    pub async fn start_call(
        &self,
        stream: &MediaStream,
        remote_id: &str,
    ) -> Result<Arc<dyn MediaCall>, SessionError> {
        let call = self.transport.call(remote_id, stream).await?;
        self.watch_ended(stream);
        Ok(call)
    }

    /// Start carrying `stream` on `link`. Returns `false` when the link
    /// already carries it.
    pub async fn attach_outgoing(
        &self,
        stream: &MediaStream,
        link: &mut PeerLink,
    ) -> Result<bool, SessionError> {
        if link.carries(stream) {
            return Ok(false);
        }
        if let Some(previous) = link.take_call() {
            previous.close().await;
        }
        let call = self.start_call(stream, link.remote_id()).await?;
        link.set_call(call, stream.id());
        debug!(remote_id = link.remote_id(), stream_id = stream.id(), "Stream attached");
        Ok(true)
    }

    /// Answer an inbound call with the microphone.
    pub async fn attach_incoming(&self, call: &Arc<dyn MediaCall>) -> Result<MediaStream, SessionError> {
        let microphone = self.acquire_microphone().await?;
        call.answer(Some(microphone.clone())).await;
        debug!(remote_id = call.remote_id(), "Call answered");
        Ok(microphone)
    }

    /// Stop and forget the screen stream.
    pub fn release_screen(&self) -> Option<MediaStream> {
        let stream = lock(&self.screen).take();
        if let Some(stream) = &stream {
            stream.stop();
        }
        stream
    }

    pub fn release_microphone(&self) -> Option<MediaStream> {
        let stream = lock(&self.microphone).take();
        if let Some(stream) = &stream {
            stream.stop();
        }
        stream
    }

    /// Stop `stream` and drop it from whichever slot holds it.
    pub fn release_stream(&self, stream: &MediaStream) {
        for slot in [&self.screen, &self.microphone] {
            let mut slot = lock(slot);
            if slot.as_ref().is_some_and(|s| s.same_as(stream)) {
                *slot = None;
            }
        }
        stream.stop();
    }

    pub fn release_all(&self) {
        self.release_screen();
        self.release_microphone();
    }

    fn watch_ended(&self, stream: &MediaStream) {
        if !lock(&self.watched).insert(stream.id().to_string()) {
            return;
        }
        let stream = stream.clone();
        let tx = self.signal_tx.clone();
        let watched = self.watched.clone();
        tokio::spawn(async move {
            stream.ended().await;
            lock(&watched).remove(stream.id());
            let _ = tx
                .send(MediaSignal::CaptureEnded {
                    stream_id: stream.id().to_string(),
                })
                .await;
        });
    }
}
