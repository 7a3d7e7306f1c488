//! Delivery channel handle: what the coordinator needs from a running channel connector.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// Handle to a running channel (stop, send message, show typing).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a conversation (e.g. Telegram chat_id).
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError>;
    /// Show a "typing" presence indicator in the conversation.
    async fn send_typing(&self, conversation_id: &str) -> Result<(), ChannelError>;
}
