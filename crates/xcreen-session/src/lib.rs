//! Session orchestration core for xcreen.
//!
//! A host broadcasts a screen share (and optionally two-way audio) to
//! participants over direct peer links, addressed by a room code. This
//! crate owns the lifecycle: identity resolution, the reload-safe room
//! cache, the host's connection registry, local media, and the per-role
//! state machines. The peer transport and capture devices are
//! collaborators behind the traits in [`transport`] and [`media`].

pub mod call;
pub mod events;
pub mod host;
pub mod identity;
pub mod loopback;
pub mod media;
pub mod options;
pub mod participant;
mod pump;
pub mod registry;
pub mod room_cache;
pub mod state;
pub mod storage;
mod sync;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use call::CallEndpoint;
pub use events::SessionEvent;
pub use host::HostSession;
pub use identity::{call_peer_id, call_url, join_url, Endpoint, PeerIdentity, PeerRole};
pub use loopback::{LoopbackNetwork, LoopbackPeer, SyntheticCapture};
pub use media::{
    MediaController, MediaDevices, MediaError, MediaSignal, MediaStream, MediaTrack, StreamKind,
    TrackKind,
};
pub use options::SessionOptions;
pub use participant::ParticipantSession;
pub use registry::{BroadcastOutcome, ConnectionRegistry, PeerLink};
pub use room_cache::{RoomCache, RoomSession, RoomUpdate};
pub use state::{CallState, SessionState};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use transport::{DataLink, MediaCall, PeerTransport, TransportError, TransportEvent};
