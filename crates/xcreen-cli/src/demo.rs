//! `xcreen demo`: a host and its viewers wired together in-process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};
use xcreen_common::XcreenError;
use xcreen_session::{
    join_url, CallState, HostSession, LoopbackNetwork, MemoryStorage, ParticipantSession,
    RoomCache, SessionEvent, SessionOptions, SessionState, SyntheticCapture,
};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(
    options: SessionOptions,
    room: Option<&str>,
    viewers: usize,
    base_url: &str,
) -> Result<(), XcreenError> {
    let network = LoopbackNetwork::new();
    let capture = Arc::new(SyntheticCapture::new());
    let cache = || RoomCache::new(Arc::new(MemoryStorage::new()), options.room_ttl);

    let (host, events) = HostSession::new(options.clone(), cache(), network.peer(), capture.clone());
    tokio::spawn(log_events("host".to_string(), events));

    let room_id = host.enter(room).await?;
    ensure(host.wait_for_state(SessionState::Open, STEP_TIMEOUT).await, "room to open")?;
    println!("Hosting room {room_id}");
    if !base_url.is_empty() {
        println!("  join: {}", join_url(base_url, &room_id));
    }

    let mut guests = Vec::with_capacity(viewers);
    for i in 0..viewers {
        let (guest, events) = ParticipantSession::new(
            options.clone(),
            cache(),
            network.peer(),
            Arc::new(SyntheticCapture::new()),
        );
        tokio::spawn(log_events(format!("viewer-{i}"), events));
        guest.join(&room_id).await?;
        ensure(guest.wait_for_state(SessionState::Open, STEP_TIMEOUT).await, "viewer to join")?;
        guests.push(guest);
    }
    let host_ref = &host;
    ensure(
        poll_until(|| async move { host_ref.viewer_count().await == viewers }).await,
        "host to register viewers",
    )?;
    println!("{viewers} viewer(s) connected");

    if let Some(first) = guests.first() {
        host.start_sharing(None).await?;
        for guest in &guests {
            ensure(
                guest.wait_for_state(SessionState::Streaming, STEP_TIMEOUT).await,
                "viewer to receive the stream",
            )?;
        }
        println!("Streaming to {viewers} viewer(s)");

        let (host_call, events) = host.start_audio_call(network.peer()).await?;
        tokio::spawn(log_events("host-call".to_string(), events));
        let (guest_call, events) = first.start_audio_call(network.peer()).await?;
        tokio::spawn(log_events("viewer-0-call".to_string(), events));
        let guest_ref = &guest_call;
        ensure(
            poll_until(|| async move { guest_ref.is_ready().await }).await,
            "call endpoint to open",
        )?;
        guest_call.dial().await?;
        ensure(
            host_call.wait_for_state(CallState::Active, STEP_TIMEOUT).await,
            "audio call to connect",
        )?;
        println!("Audio call active with {}", first.peer_id());

        host.stop_sharing().await?;
        for guest in &guests {
            ensure(
                guest.wait_for_state(SessionState::Open, STEP_TIMEOUT).await,
                "viewer to see the share stop",
            )?;
        }
        println!("Sharing stopped");
    }

    for guest in &guests {
        guest.leave().await;
    }
    host.end_session().await;
    println!("Session ended");
    Ok(())
}

async fn log_events(label: String, mut rx: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Notify(n) => {
                info!(peer = %label, level = ?n.level, title = %n.title, body = %n.body, "Notification")
            }
            SessionEvent::StateChanged { from, to, .. } => {
                info!(peer = %label, %from, %to, "State changed")
            }
            SessionEvent::CallStateChanged { from, to, .. } => {
                info!(peer = %label, %from, %to, "Call state changed")
            }
            other => debug!(peer = %label, event = ?other, "Session event"),
        }
    }
}

async fn poll_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn ensure(ok: bool, step: &str) -> Result<(), XcreenError> {
    if ok {
        Ok(())
    } else {
        Err(XcreenError::Other(format!("timed out waiting for {step}")))
    }
}
