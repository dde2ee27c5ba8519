pub mod errors;
pub mod id;
pub mod notifications;

pub use errors::{ConfigError, SessionError, XcreenError};
pub use id::{new_id, new_room_code, SessionId};
pub use notifications::{Notification, NotificationLevel};

pub type Result<T> = std::result::Result<T, XcreenError>;
