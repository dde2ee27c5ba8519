use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures surfaced by the session orchestration core.
///
/// Transport and media errors leave the state machine in its last
/// known-good state. `CacheCorruption` is recovered inside the room cache
/// and only appears in logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("room id already claimed: {0}")]
    IdentityConflict(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("media acquisition error: {0}")]
    MediaAcquisition(String),

    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("room code required")]
    InvalidRoomCode,

    #[error("no viewers connected")]
    NoViewers,

    #[error("session has ended")]
    SessionEnded,

    #[error("session changed while the operation was in flight")]
    Stale,
}

impl SessionError {
    /// Whether this error should be shown to the user as a notification.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::CacheCorruption(_) | Self::Stale)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum XcreenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("session.room_ttl_hours".into());
        assert_eq!(
            err.to_string(),
            "config validation error: session.room_ttl_hours"
        );
    }

    #[test]
    fn session_error_display() {
        let err = SessionError::IdentityConflict("abc123".into());
        assert_eq!(err.to_string(), "room id already claimed: abc123");

        let err = SessionError::MediaAcquisition("permission denied".into());
        assert_eq!(
            err.to_string(),
            "media acquisition error: permission denied"
        );

        let err = SessionError::InvalidTransition {
            from: "Ended".into(),
            to: "Connecting".into(),
        };
        assert_eq!(err.to_string(), "invalid transition from Ended to Connecting");

        assert_eq!(SessionError::InvalidRoomCode.to_string(), "room code required");
    }

    #[test]
    fn cache_corruption_is_not_user_visible() {
        assert!(!SessionError::CacheCorruption("bad json".into()).is_user_visible());
        assert!(!SessionError::Stale.is_user_visible());
        assert!(SessionError::Transport("peer unavailable".into()).is_user_visible());
        assert!(SessionError::MediaAcquisition("denied".into()).is_user_visible());
    }

    #[test]
    fn xcreen_error_from_session() {
        let err: XcreenError = SessionError::NoViewers.into();
        assert!(matches!(err, XcreenError::Session(SessionError::NoViewers)));
        assert_eq!(err.to_string(), "no viewers connected");
    }

    #[test]
    fn xcreen_error_from_config() {
        let err: XcreenError = ConfigError::ParseError("bad toml".into()).into();
        assert!(matches!(err, XcreenError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn xcreen_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: XcreenError = io_err.into();
        assert!(matches!(err, XcreenError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
