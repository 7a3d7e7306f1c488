//! Inbound message from a channel: delivered to the session coordinator.

/// Placeholder used when the sender has no username.
pub const UNKNOWN_USERNAME: &str = "unknown";

/// What the user sent: the start command or free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Start,
    Text,
}

/// A message from a channel to be answered by the session coordinator.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub kind: InboundKind,
    pub user_id: i64,
    pub username: Option<String>,
    pub text: String,
    /// Conversation to reply to (e.g. Telegram chat_id).
    pub chat_id: String,
}

impl InboundMessage {
    /// Username, or [`UNKNOWN_USERNAME`] when the sender has none.
    pub fn display_username(&self) -> &str {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(UNKNOWN_USERNAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(username: Option<&str>) -> InboundMessage {
        InboundMessage {
            channel_id: "telegram".to_string(),
            kind: InboundKind::Text,
            user_id: 1,
            username: username.map(str::to_string),
            text: "hi".to_string(),
            chat_id: "1".to_string(),
        }
    }

    #[test]
    fn display_username_falls_back_to_placeholder() {
        assert_eq!(message(None).display_username(), "unknown");
        assert_eq!(message(Some("")).display_username(), "unknown");
        assert_eq!(message(Some("alice")).display_username(), "alice");
    }
}
