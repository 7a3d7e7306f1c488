//! In-memory fakes for the channel, answer producer and event sink, used by unit tests.

use crate::channels::{ChannelError, ChannelHandle};
use crate::events::{EventSink, EventType, SessionEvent, SinkError};
use crate::llm::{AnswerProducer, AskOptions, RemoteServiceError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    Typing(String),
    Message(String, String),
}

/// Channel that records successful sends in order.
#[derive(Default)]
pub struct FakeChannel {
    actions: Mutex<Vec<ChannelAction>>,
    fail_typing: AtomicBool,
    fail_messages: AtomicUsize,
    typing_attempts: AtomicUsize,
    message_attempts: AtomicUsize,
}

impl FakeChannel {
    pub fn actions(&self) -> Vec<ChannelAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                ChannelAction::Message(chat, text) => Some((chat, text)),
                ChannelAction::Typing(_) => None,
            })
            .collect()
    }

    pub fn fail_typing(&self, fail: bool) {
        self.fail_typing.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` send_message calls.
    pub fn fail_next_messages(&self, n: usize) {
        self.fail_messages.store(n, Ordering::SeqCst);
    }

    pub fn typing_attempts(&self) -> usize {
        self.typing_attempts.load(Ordering::SeqCst)
    }

    pub fn message_attempts(&self) -> usize {
        self.message_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelHandle for FakeChannel {
    fn id(&self) -> &str {
        "fake"
    }

    fn stop(&self) {}

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        self.message_attempts.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_messages.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_messages.store(pending - 1, Ordering::SeqCst);
            return Err(ChannelError::Api("sendMessage failed: 502".to_string()));
        }
        self.actions
            .lock()
            .unwrap()
            .push(ChannelAction::Message(conversation_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), ChannelError> {
        self.typing_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_typing.load(Ordering::SeqCst) {
            return Err(ChannelError::Api("sendChatAction failed: 429".to_string()));
        }
        self.actions
            .lock()
            .unwrap()
            .push(ChannelAction::Typing(conversation_id.to_string()));
        Ok(())
    }
}

/// Producer that answers after `latency` with a fixed result and records the calls it got.
pub struct FakeProducer {
    answer: Result<String, String>,
    latency: Duration,
    calls: Mutex<Vec<(String, i64, AskOptions)>>,
}

impl FakeProducer {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Ok(text.to_string()),
            latency: Duration::from_secs(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
            latency: Duration::from_secs(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<(String, i64, AskOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerProducer for FakeProducer {
    async fn ask(
        &self,
        text: &str,
        user_id: i64,
        options: &AskOptions,
    ) -> Result<String, RemoteServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), user_id, options.clone()));
        tokio::time::sleep(self.latency).await;
        self.answer.clone().map_err(RemoteServiceError::Api)
    }
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<SessionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &SessionEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
