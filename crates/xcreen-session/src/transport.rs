//! Narrow surface of the peer-connection/signaling collaborator.
//!
//! The core never touches framing or negotiation. It opens an identity,
//! dials or calls remote ids, and consumes the resulting events from a
//! single channel per opened identity.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use xcreen_common::SessionError;

use crate::media::MediaStream;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("id {0} is already taken")]
    IdUnavailable(String),

    #[error("peer {0} is unavailable")]
    PeerUnavailable(String),

    #[error("transport is not open")]
    NotOpen,

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::IdUnavailable(id) => SessionError::IdentityConflict(id),
            other => SessionError::Transport(other.to_string()),
        }
    }
}

/// An open point-to-point data connection.
#[async_trait]
pub trait DataLink: fmt::Debug + Send + Sync {
    fn remote_id(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Closing twice is a no-op.
    async fn close(&self);
}

/// A media call layered on a peer connection.
#[async_trait]
pub trait MediaCall: fmt::Debug + Send + Sync {
    fn remote_id(&self) -> &str;

    /// Accept an inbound call, optionally sending a local stream back.
    async fn answer(&self, stream: Option<MediaStream>);

    /// Closing twice is a no-op.
    async fn close(&self);
}

/// Everything the transport reports for one opened identity.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Signaling handshake finished; `local_id` is now reachable.
    Open { local_id: String },
    /// A remote peer dialed us.
    Connection { link: Arc<dyn DataLink> },
    /// A link we dialed is ready.
    LinkOpen { remote_id: String },
    LinkClosed { remote_id: String },
    /// A remote peer is calling us.
    Call { call: Arc<dyn MediaCall> },
    /// Media arrived from `remote_id` on an established call.
    RemoteStream { remote_id: String, stream: MediaStream },
    CallClosed { remote_id: String },
    Error { message: String },
}

impl TransportEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Connection { .. } => "connection",
            Self::LinkOpen { .. } => "link_open",
            Self::LinkClosed { .. } => "link_closed",
            Self::Call { .. } => "call",
            Self::RemoteStream { .. } => "remote_stream",
            Self::CallClosed { .. } => "call_closed",
            Self::Error { .. } => "error",
        }
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Claim `local_id` on the signaling layer. Events for this identity
    /// arrive on the returned channel, starting with `Open`.
    async fn open(&self, local_id: &str) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    async fn connect(&self, remote_id: &str) -> Result<Arc<dyn DataLink>, TransportError>;

    async fn call(
        &self,
        remote_id: &str,
        stream: &MediaStream,
    ) -> Result<Arc<dyn MediaCall>, TransportError>;

    /// Release the identity and close every link and call still held.
    async fn destroy(&self);
}
