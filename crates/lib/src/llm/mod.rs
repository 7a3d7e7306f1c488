//! Answer producer abstraction and the DeepSeek client.
//!
//! The coordinator only sees [`AnswerProducer`]: text in, answer text or [`RemoteServiceError`] out.

mod deepseek;

pub use deepseek::DeepSeekClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Conversation mode sent with every call. Selects the model and system prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Regular chat model.
    #[default]
    Chat,
    /// Reasoning model; slower, better at multi-step questions.
    Reasoner,
}

impl ConversationMode {
    pub fn default_model(&self) -> &'static str {
        match self {
            ConversationMode::Chat => "deepseek-chat",
            ConversationMode::Reasoner => "deepseek-reasoner",
        }
    }
}

/// Per-call options. Deployment-wide: built once from config, identical for every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskOptions {
    /// Ask for a JSON object (`{"answer": ...}`) and extract the answer from it.
    pub use_structured: bool,
    pub mode: ConversationMode,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteServiceError {
    #[error("answer request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("answer api error: {0}")]
    Api(String),
    #[error("malformed answer: {0}")]
    MalformedResponse(String),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("{0} not configured")]
    NotConfigured(&'static str),
}

/// External service that turns a user's message into a reply.
#[async_trait]
pub trait AnswerProducer: Send + Sync {
    async fn ask(
        &self,
        text: &str,
        user_id: i64,
        options: &AskOptions,
    ) -> Result<String, RemoteServiceError>;
}
