//! Participant-side session: joins a room by code and watches the host's
//! screen.

mod session;

pub use session::ParticipantSession;
