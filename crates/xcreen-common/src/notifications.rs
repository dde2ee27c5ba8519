use serde::{Deserialize, Serialize};

/// Severity level for user-visible notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A toast-style notification handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
    /// Label of the action the presentation layer may offer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Notification {
    fn new(level: NotificationLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            body: body.into(),
            action: None,
        }
    }

    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, body)
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, body)
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, body)
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, body)
    }

    /// Attach an action label ("Start Sharing").
    pub fn with_action(mut self, label: impl Into<String>) -> Self {
        self.action = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_level() {
        assert_eq!(Notification::info("a", "b").level, NotificationLevel::Info);
        assert_eq!(
            Notification::success("a", "b").level,
            NotificationLevel::Success
        );
        assert_eq!(
            Notification::warning("a", "b").level,
            NotificationLevel::Warning
        );
        assert_eq!(Notification::error("a", "b").level, NotificationLevel::Error);
    }

    #[test]
    fn with_action_sets_label() {
        let n = Notification::info("New viewer connected", "Click to start sharing your screen")
            .with_action("Start Sharing");
        assert_eq!(n.action.as_deref(), Some("Start Sharing"));
    }

    #[test]
    fn serializes_without_empty_action() {
        let json = serde_json::to_string(&Notification::warning("Session ended", "")).unwrap();
        assert!(json.contains("\"warning\""));
        assert!(!json.contains("action"));
    }
}
