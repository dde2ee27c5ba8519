//! Single dispatch point per opened transport.
//!
//! Every transport event and media signal for one state-machine instance is
//! forwarded, in arrival order, to [`Dispatch::dispatch`] tagged with the
//! session id that opened the transport. Handlers compare it with the live
//! id and drop anything stale.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use xcreen_common::SessionId;

use crate::media::MediaSignal;
use crate::transport::TransportEvent;

#[derive(Debug)]
pub(crate) enum Input {
    Transport(TransportEvent),
    Media(MediaSignal),
}

#[async_trait]
pub(crate) trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, session_id: &SessionId, input: Input);
}

pub(crate) fn spawn<D: Dispatch>(
    target: D,
    session_id: SessionId,
    cancel: CancellationToken,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut media_rx: Option<mpsc::Receiver<MediaSignal>>,
) {
    tokio::spawn(async move {
        loop {
            let input = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = transport_rx.recv() => match event {
                    Some(event) => Input::Transport(event),
                    None => break,
                },
                Some(signal) = recv_signal(&mut media_rx) => Input::Media(signal),
            };
            target.dispatch(&session_id, input).await;
        }
        debug!(session = %session_id, "Event pump stopped");
    });
}

async fn recv_signal(rx: &mut Option<mpsc::Receiver<MediaSignal>>) -> Option<MediaSignal> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
