//! Session events: structured records of what happened while handling a user's message.
//!
//! Events are built by the [`EventEmitter`] and handed to an [`EventSink`]. Today the only sink
//! writes a log line; the record shape is kept stable and deserializable so it can seed a durable
//! event log later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Kind of session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CommandStart,
    UserMessage,
    BotResponse,
}

/// Event payload: string keys to JSON scalars/strings.
pub type EventPayload = serde_json::Map<String, serde_json::Value>;

/// A write-once record of one thing that happened in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub user_id: i64,
    #[serde(default)]
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(event_type: EventType, user_id: i64, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            user_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for session events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &SessionEvent) -> Result<(), SinkError>;
}

/// Sink that writes each event as one JSON log line at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &SessionEvent) -> Result<(), SinkError> {
        let json = serde_json::to_string(event)?;
        log::info!("event: {}", json);
        Ok(())
    }
}

/// Builds session events and forwards them to the sink. Never fails towards the caller.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Emitter backed by [`LogSink`].
    pub fn logging() -> Self {
        Self::new(Arc::new(LogSink))
    }

    pub fn emit(&self, event_type: EventType, user_id: i64, payload: EventPayload) {
        let event = SessionEvent::new(event_type, user_id, payload);
        if let Err(e) = self.sink.record(&event) {
            log::warn!("events: dropping {:?} event for user {}: {}", event_type, user_id, e);
        }
    }
}

/// Build an [`EventPayload`] from `key => value` pairs.
#[macro_export]
macro_rules! event_payload {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = $crate::events::EventPayload::new();
        $( map.insert($key.to_string(), ::serde_json::json!($value)); )*
        map
    }};
}
