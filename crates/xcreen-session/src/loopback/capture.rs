use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::media::{MediaDevices, MediaError, MediaStream};
use crate::sync::lock;

/// Capture source that fabricates streams. Permission can be denied and
/// acquisition delayed to exercise failure and cancellation paths.
#[derive(Debug, Default)]
pub struct SyntheticCapture {
    display_requests: AtomicUsize,
    audio_requests: AtomicUsize,
    deny_display: AtomicBool,
    deny_audio: AtomicBool,
    delay: Mutex<Option<Duration>>,
    last_display: Mutex<Option<MediaStream>>,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_display(&self, deny: bool) {
        self.deny_display.store(deny, Ordering::SeqCst);
    }

    pub fn deny_audio(&self, deny: bool) {
        self.deny_audio.store(deny, Ordering::SeqCst);
    }

    /// Hold every request for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// How many times the screen was requested (each one a permission prompt).
    pub fn display_requests(&self) -> usize {
        self.display_requests.load(Ordering::SeqCst)
    }

    pub fn audio_requests(&self) -> usize {
        self.audio_requests.load(Ordering::SeqCst)
    }

    /// The most recent screen stream handed out.
    pub fn last_display(&self) -> Option<MediaStream> {
        lock(&self.last_display).clone()
    }

    async fn wait(&self) {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MediaDevices for SyntheticCapture {
    async fn get_display_media(&self) -> Result<MediaStream, MediaError> {
        self.display_requests.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        if self.deny_display.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }
        let stream = MediaStream::screen();
        *lock(&self.last_display) = Some(stream.clone());
        Ok(stream)
    }

    async fn get_user_audio(&self) -> Result<MediaStream, MediaError> {
        self.audio_requests.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        if self.deny_audio.load(Ordering::SeqCst) {
            return Err(MediaError::NoSource);
        }
        Ok(MediaStream::microphone())
    }
}
