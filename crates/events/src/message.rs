//! Event payloads flowing through the channels and their wire form.

use bujo_core::types::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// An event emitted by a producer.
///
/// `producer` is stamped by the fan-in with the name of the adapter the
/// event arrived on, so whatever the producer wrote there is advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Name of the originating producer, e.g. `"cleaner"`.
    pub producer: String,

    /// Producer-specific payload. The cleaner sends a project id.
    pub payload: serde_json::Value,

    /// When the producer created the event (UTC).
    pub created_at: Timestamp,
}

impl EventMessage {
    /// Create an untagged event carrying `payload`.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            producer: String::new(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Tag the event with a producer name, replacing any previous tag.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = producer.into();
        self
    }
}

/// A message as written to a subscriber's transport.
///
/// Serialises to `{"id": "cleaner", "message": "42"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Producer name the message originated from.
    pub id: String,
    /// Producer-specific text body.
    pub message: String,
}

impl StreamMessage {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }
}
