//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chimera/config.json`) and environment.
//! Everything here is deployment-wide and read-only once the gateway has started.

use crate::llm::{AskOptions, ConversationMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings (health probe, Telegram webhook).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Answer producer (DeepSeek) settings.
    #[serde(default)]
    pub answer: AnswerConfig,

    /// Typing indicator settings.
    #[serde(default)]
    pub typing: TypingConfig,

    /// Fixed user-facing texts.
    #[serde(default)]
    pub messages: MessagesConfig,

    /// What to do when the reply itself cannot be delivered.
    #[serde(default)]
    pub critical_error_policy: CriticalErrorPolicy,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// Answer producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerConfig {
    /// API base URL (default https://api.deepseek.com).
    pub base_url: Option<String>,
    /// API key. Overridden by DEEPSEEK_API_KEY env when set.
    pub api_key: Option<String>,
    /// Model id; when unset the conversation mode picks one.
    pub model: Option<String>,
    /// Ask the service for a JSON object and extract the answer from it.
    #[serde(default = "default_use_json_mode")]
    pub use_json_mode: bool,
    /// Conversation mode: "chat" (default) or "reasoner".
    #[serde(default)]
    pub mode: ConversationMode,
    /// Deadline for one answer in seconds. The typing indicator stops when it passes.
    #[serde(default = "default_answer_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_use_json_mode() -> bool {
    true
}

fn default_answer_timeout_secs() -> u64 {
    60
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
            use_json_mode: default_use_json_mode(),
            mode: ConversationMode::default(),
            timeout_secs: default_answer_timeout_secs(),
        }
    }
}

impl AnswerConfig {
    pub fn ask_options(&self) -> AskOptions {
        AskOptions {
            use_structured: self.use_json_mode,
            mode: self.mode,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Typing indicator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingConfig {
    /// Pause between two typing indicators in milliseconds (default 4000).
    #[serde(default = "default_typing_delay_ms")]
    pub delay_ms: u64,
}

fn default_typing_delay_ms() -> u64 {
    4000
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_typing_delay_ms(),
        }
    }
}

impl TypingConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.max(100))
    }
}

/// Fixed texts sent to users. Not templated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesConfig {
    /// Reply to the start command.
    #[serde(default = "default_welcome")]
    pub welcome: String,
    /// Reply when no answer could be produced.
    #[serde(default = "default_error_processing")]
    pub error_processing: String,
}

fn default_welcome() -> String {
    "Hi! I'm Chimera. Send me a message and I'll answer.".to_string()
}

fn default_error_processing() -> String {
    "Sorry, something went wrong while processing your message. Please try again later.".to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
            error_processing: default_error_processing(),
        }
    }
}

/// Behaviour when even the error message for a failed answer cannot be delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CriticalErrorPolicy {
    /// Log and drop; the user gets nothing.
    #[default]
    Silent,
    /// Log, then make one more attempt to send the error message.
    NotifyUser,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN").or_else(|| non_empty(config.channels.telegram.bot_token.as_ref()))
}

/// Resolve the answer service API key: env DEEPSEEK_API_KEY overrides config.
pub fn resolve_answer_api_key(config: &Config) -> Option<String> {
    non_empty_env("DEEPSEEK_API_KEY").or_else(|| non_empty(config.answer.api_key.as_ref()))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHIMERA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".chimera").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or CHIMERA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
