//! Telegram channel: long-poll getUpdates, sendMessage and sendChatAction via Bot API.

use crate::channels::handle::{ChannelError, ChannelHandle};
use crate::channels::inbound::{InboundKind, InboundMessage};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);
const START_COMMAND: &str = "/start";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUpdate {
    /// Convert to an inbound message. `/start` becomes [`InboundKind::Start`], other commands and
    /// non-text updates are dropped.
    pub fn into_inbound(self, channel_id: &str) -> Option<InboundMessage> {
        let msg = self.message?;
        let text = msg.text?;
        let kind = match command_name(&text) {
            Some(START_COMMAND) => InboundKind::Start,
            Some(other) => {
                log::debug!("telegram: ignoring unsupported command {}", other);
                return None;
            }
            None => InboundKind::Text,
        };
        // Messages in channels have no sender; fall back to the chat id.
        let (user_id, username) = match msg.from {
            Some(u) => (u.id, u.username),
            None => (msg.chat.id, None),
        };
        Some(InboundMessage {
            channel_id: channel_id.to_string(),
            kind,
            user_id,
            username,
            text,
            chat_id: msg.chat.id.to_string(),
        })
    }
}

/// Command name without the `@botname` suffix, if the text starts with one.
fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') || first.len() < 2 {
        return None;
    }
    Some(first.split('@').next().unwrap_or(first))
}

/// Telegram channel connector: long-polls for updates, sends replies and typing actions.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: telegram_api_base(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, ChannelError> {
        let token = self
            .token
            .as_ref()
            .ok_or(ChannelError::NotConfigured("telegram bot token"))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// POST a Bot API method with a JSON body; fails on non-2xx or `ok: false`.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>, ChannelError> {
        let url = self.method_url(method)?;
        let res = self.client.post(&url).json(body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse<T> = res.json().await?;
        if !data.ok {
            return Err(ChannelError::Api(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            )));
        }
        Ok(data.result)
    }

    /// Start the getUpdates long-poll loop and forward messages to the gateway. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let mut body = serde_json::json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            body["offset"] = serde_json::json!(off);
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &body).await?.unwrap_or_default();
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        self.call::<serde_json::Value>("setWebhook", &body).await?;
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>("deleteWebhook", &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for inbound in updates.into_iter().filter_map(|u| u.into_inbound(&channel.id)) {
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": conversation_id, "text": text });
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": conversation_id, "action": "typing" });
        self.call::<serde_json::Value>("sendChatAction", &body).await?;
        Ok(())
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .ok()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn text_message_becomes_text_inbound() {
        let u = update(serde_json::json!({
            "update_id": 10,
            "message": {
                "chat": { "id": 100 },
                "from": { "id": 7, "username": "bob" },
                "text": "hello"
            }
        }));
        let msg = u.into_inbound("telegram").unwrap();
        assert_eq!(msg.kind, InboundKind::Text);
        assert_eq!(msg.user_id, 7);
        assert_eq!(msg.username.as_deref(), Some("bob"));
        assert_eq!(msg.chat_id, "100");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn start_command_with_bot_suffix_is_start() {
        let u = update(serde_json::json!({
            "update_id": 11,
            "message": { "chat": { "id": 42 }, "from": { "id": 42 }, "text": "/start@chimera_bot" }
        }));
        let msg = u.into_inbound("telegram").unwrap();
        assert_eq!(msg.kind, InboundKind::Start);
        assert!(msg.username.is_none());
    }

    #[test]
    fn other_commands_and_non_text_are_dropped() {
        let cmd = update(serde_json::json!({
            "update_id": 12,
            "message": { "chat": { "id": 1 }, "from": { "id": 1 }, "text": "/help" }
        }));
        assert!(cmd.into_inbound("telegram").is_none());
        let sticker = update(serde_json::json!({
            "update_id": 13,
            "message": { "chat": { "id": 1 }, "from": { "id": 1 } }
        }));
        assert!(sticker.into_inbound("telegram").is_none());
        let edited = update(serde_json::json!({ "update_id": 14 }));
        assert!(edited.into_inbound("telegram").is_none());
    }

    #[test]
    fn whitespace_text_passes_through_unchanged() {
        let u = update(serde_json::json!({
            "update_id": 15,
            "message": { "chat": { "id": 5 }, "from": { "id": 5 }, "text": "   " }
        }));
        let msg = u.into_inbound("telegram").unwrap();
        assert_eq!(msg.kind, InboundKind::Text);
        assert_eq!(msg.text, "   ");
    }

    #[test]
    fn command_name_strips_bot_suffix() {
        assert_eq!(command_name("/start"), Some("/start"));
        assert_eq!(command_name("/start@bot payload"), Some("/start"));
        assert_eq!(command_name("hello /start"), None);
        assert_eq!(command_name("/"), None);
    }

    #[tokio::test]
    async fn sending_without_token_is_not_configured() {
        let channel = TelegramChannel::new(None);
        let err = channel.send_message("1", "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }
}
