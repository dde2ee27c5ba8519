use std::time::Duration;

/// Runtime knobs shared by the session state machines.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Room records idle longer than this are treated as absent.
    pub room_ttl: Duration,
    /// Capacity of the event and signal channels.
    pub event_buffer: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            room_ttl: Duration::from_secs(24 * 60 * 60),
            event_buffer: 256,
        }
    }
}
