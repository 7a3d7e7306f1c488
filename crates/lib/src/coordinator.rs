//! Session coordinator: handles one inbound message end to end.
//!
//! For a text message: record a `user_message` event, show typing while the answer producer
//! works, stop and join the typing loop, then send exactly one reply (the answer, or the fixed
//! error text) and record `bot_response` on success. The start command gets the welcome text.
//!
//! The coordinator is built once by the gateway and shared as `Arc` by all message tasks. It holds
//! no per-message state, so messages from different users never interfere.

use crate::channels::{ChannelError, ChannelHandle, InboundKind, InboundMessage};
use crate::config::{Config, CriticalErrorPolicy};
use crate::event_payload;
use crate::events::{EventEmitter, EventType};
use crate::llm::{AnswerProducer, AskOptions, RemoteServiceError};
use crate::typing::TypingSignal;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Deployment-wide settings used for every message.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub welcome: String,
    pub error_processing: String,
    pub typing_delay: Duration,
    /// Upper bound for one answer; the typing loop never outlives it.
    pub answer_timeout: Duration,
    pub ask_options: AskOptions,
    pub critical_error_policy: CriticalErrorPolicy,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            welcome: config.messages.welcome.clone(),
            error_processing: config.messages.error_processing.clone(),
            typing_delay: config.typing.delay(),
            answer_timeout: config.answer.timeout(),
            ask_options: config.answer.ask_options(),
            critical_error_policy: config.critical_error_policy,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Failure to deliver a reply. Only `ErrorDelivery` ends handling of a text message.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("delivering answer failed: {0}")]
    AnswerDelivery(#[source] ChannelError),
    #[error("delivering error message failed: {0}")]
    ErrorDelivery(#[source] ChannelError),
    #[error("delivering welcome failed: {0}")]
    WelcomeDelivery(#[source] ChannelError),
}

pub struct SessionCoordinator {
    channel: Arc<dyn ChannelHandle>,
    producer: Arc<dyn AnswerProducer>,
    emitter: EventEmitter,
    settings: CoordinatorSettings,
}

impl SessionCoordinator {
    pub fn new(
        channel: Arc<dyn ChannelHandle>,
        producer: Arc<dyn AnswerProducer>,
        emitter: EventEmitter,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            channel,
            producer,
            emitter,
            settings,
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Route a message by kind.
    pub async fn dispatch(&self, msg: &InboundMessage) {
        match msg.kind {
            InboundKind::Start => self.handle_start(msg).await,
            InboundKind::Text => self.handle_message(msg).await,
        }
    }

    /// Start command: record it and send the welcome text. No answer is requested.
    pub async fn handle_start(&self, msg: &InboundMessage) {
        self.emitter.emit(
            EventType::CommandStart,
            msg.user_id,
            event_payload! {
                "username" => msg.display_username(),
                "chat_id" => &msg.chat_id,
                "timestamp" => Utc::now().to_rfc3339(),
            },
        );
        if let Err(e) = self
            .channel
            .send_message(&msg.chat_id, &self.settings.welcome)
            .await
            .map_err(CoordinatorError::WelcomeDelivery)
        {
            log::error!("coordinator: start command from user {}: {}", msg.user_id, e);
        }
    }

    /// Text message: answer it. Never returns an error; delivery failures are logged and
    /// handled according to the critical error policy.
    pub async fn handle_message(&self, msg: &InboundMessage) {
        if let Err(e) = self.process_message(msg).await {
            log::error!(
                "coordinator: message from user {} in chat {} not answered: {}",
                msg.user_id,
                msg.chat_id,
                e
            );
            self.apply_critical_error_policy(msg, &e).await;
        }
    }

    async fn process_message(&self, msg: &InboundMessage) -> Result<(), CoordinatorError> {
        self.emitter.emit(
            EventType::UserMessage,
            msg.user_id,
            event_payload! {
                "text" => &msg.text,
                "username" => msg.display_username(),
                "chat_id" => &msg.chat_id,
                "timestamp" => Utc::now().to_rfc3339(),
            },
        );

        let typing = TypingSignal::start(
            self.channel.clone(),
            msg.chat_id.clone(),
            self.settings.typing_delay,
        );
        let answer = self.ask(msg).await;
        // Joined on every outcome so no indicator can follow the reply.
        if let Err(e) = typing.stop().await {
            log::warn!("coordinator: typing loop for chat {} ended abnormally: {}", msg.chat_id, e);
        }

        match answer {
            Ok(text) => match self.channel.send_message(&msg.chat_id, &text).await {
                Ok(()) => {
                    self.emitter.emit(
                        EventType::BotResponse,
                        msg.user_id,
                        event_payload! {
                            "text" => &text,
                            "chat_id" => &msg.chat_id,
                            "timestamp" => Utc::now().to_rfc3339(),
                        },
                    );
                    return Ok(());
                }
                // e.g. an answer over Telegram's message length limit; the user still gets the error text.
                Err(e) => log::error!(
                    "coordinator: reply to user {}: {}",
                    msg.user_id,
                    CoordinatorError::AnswerDelivery(e)
                ),
            },
            Err(e) => log::error!("coordinator: answer for user {} failed: {}", msg.user_id, e),
        }
        self.channel
            .send_message(&msg.chat_id, &self.settings.error_processing)
            .await
            .map_err(CoordinatorError::ErrorDelivery)
    }

    /// Ask the producer, bounded by the answer deadline.
    async fn ask(&self, msg: &InboundMessage) -> Result<String, RemoteServiceError> {
        let deadline = self.settings.answer_timeout;
        let call = self
            .producer
            .ask(&msg.text, msg.user_id, &self.settings.ask_options);
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteServiceError::Timeout(deadline)),
        }
    }

    async fn apply_critical_error_policy(&self, msg: &InboundMessage, err: &CoordinatorError) {
        let notify = self.settings.critical_error_policy == CriticalErrorPolicy::NotifyUser
            && matches!(err, CoordinatorError::ErrorDelivery(_));
        if !notify {
            return;
        }
        if let Err(e) = self
            .channel
            .send_message(&msg.chat_id, &self.settings.error_processing)
            .await
        {
            log::error!("coordinator: error notice to chat {} failed too: {}", msg.chat_id, e);
        }
    }
}
