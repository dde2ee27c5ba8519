//! Audio call endpoint layered on a room.
//!
//! The host listens on `host-<room>` and answers with its microphone. A
//! participant listens on `participant-<room>` and dials the host. The call
//! has its own transport identity and lifecycle ([`CallState`]); it only
//! needs the room id.
//!
//! [`CallState`]: crate::state::CallState

mod endpoint;

pub use endpoint::CallEndpoint;
