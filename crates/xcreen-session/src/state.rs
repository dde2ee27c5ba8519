//! Lifecycle states and their allowed transitions.

use std::fmt;

use xcreen_common::SessionError;

/// Screen-share session lifecycle. `Ended` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Streaming,
    Ended,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Ended, _) => false,
            (_, Ended) => true,
            (Idle, Connecting) => true,
            (Connecting, Open) | (Connecting, Idle) => true,
            (Open, Streaming) | (Streaming, Open) => true,
            _ => false,
        }
    }

    /// Move to `next`, or report why not.
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, SessionError> {
        if !self.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        let previous = *self;
        *self = next;
        Ok(previous)
    }

    /// Open or Streaming.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Open | Self::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Streaming => "Streaming",
            Self::Ended => "Ended",
        };
        f.write_str(name)
    }
}

/// Audio call sub-state, independent of [`SessionState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallState {
    #[default]
    Idle,
    Connecting,
    Active,
    Ended,
}

impl CallState {
    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Ended, _) => false,
            (_, Ended) => true,
            (Idle, Connecting) => true,
            (Connecting, Active) | (Connecting, Idle) => true,
            (Active, Idle) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, next: CallState) -> Result<CallState, SessionError> {
        if !self.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        let previous = *self;
        *self = next;
        Ok(previous)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "CallIdle",
            Self::Connecting => "CallConnecting",
            Self::Active => "CallActive",
            Self::Ended => "CallEnded",
        };
        f.write_str(name)
    }
}
