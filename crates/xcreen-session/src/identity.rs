//! Peer id resolution and share links.

use serde::{Deserialize, Serialize};
use xcreen_common::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Host,
    Participant,
}

impl PeerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Participant => "participant",
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transport a peer id is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Screen-share transport.
    Primary,
    /// Audio call endpoint.
    Call,
}

/// Resolves transport ids for one client.
///
/// Only the host has to be discoverable by room code, so a participant's
/// primary id is a fresh uuid generated once per resolver.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    participant_id: String,
}

impl PeerIdentity {
    pub fn new() -> Self {
        Self {
            participant_id: new_id(),
        }
    }

    pub fn resolve(&self, room_id: &str, role: PeerRole, endpoint: Endpoint) -> String {
        match (endpoint, role) {
            (Endpoint::Primary, PeerRole::Host) => room_id.to_string(),
            (Endpoint::Primary, PeerRole::Participant) => self.participant_id.clone(),
            (Endpoint::Call, role) => call_peer_id(room_id, role),
        }
    }
}

impl Default for PeerIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// `host-<room>` or `participant-<room>`.
pub fn call_peer_id(room_id: &str, role: PeerRole) -> String {
    format!("{}-{room_id}", role.as_str())
}

/// Link a participant opens to join a room.
pub fn join_url(base_url: &str, room_id: &str) -> String {
    format!("{}/join?room={room_id}", base_url.trim_end_matches('/'))
}

/// Link to the audio call page for a room.
pub fn call_url(base_url: &str, room_id: &str, host: bool) -> String {
    format!(
        "{}/call?roomId={room_id}&host={host}",
        base_url.trim_end_matches('/')
    )
}
