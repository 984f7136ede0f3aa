//! Mapping from producer events to wire messages.
//!
//! Only producers with a defined wire format are delivered. Everything else
//! is reported as [`Undeliverable::Unmapped`] so the session can log and
//! skip it; new producers can start emitting before their format exists.

use bujo_core::producers::PRODUCER_CLEANER;

use crate::message::{EventMessage, StreamMessage};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Undeliverable {
    #[error("no delivery mapping for producer '{0}'")]
    Unmapped(String),

    #[error("invalid payload from producer '{producer}': {reason}")]
    InvalidPayload { producer: String, reason: String },
}

/// Convert an event into the message written to the subscriber.
pub fn encode(event: &EventMessage) -> Result<StreamMessage, Undeliverable> {
    match event.producer.as_str() {
        PRODUCER_CLEANER => encode_cleaner(event),
        other => Err(Undeliverable::Unmapped(other.to_string())),
    }
}

/// Cleaner events carry the id of a deleted project, sent as decimal text.
fn encode_cleaner(event: &EventMessage) -> Result<StreamMessage, Undeliverable> {
    let project_id = event
        .payload
        .as_i64()
        .ok_or_else(|| Undeliverable::InvalidPayload {
            producer: event.producer.clone(),
            reason: format!("expected an integer project id, got {}", event.payload),
        })?;
    Ok(StreamMessage::new(PRODUCER_CLEANER, project_id.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bujo_core::producers::{PRODUCER_INVESTMENT, PRODUCER_REMINDER};

    use super::*;

    fn event(producer: &str, payload: serde_json::Value) -> EventMessage {
        EventMessage::new(payload).with_producer(producer)
    }

    #[test]
    fn cleaner_project_id_becomes_decimal_text() {
        let wire = encode(&event(PRODUCER_CLEANER, serde_json::json!(42))).unwrap();
        assert_eq!(wire, StreamMessage::new("cleaner", "42"));
    }

    #[test]
    fn cleaner_rejects_non_integer_payload() {
        assert_matches!(
            encode(&event(PRODUCER_CLEANER, serde_json::json!("42"))),
            Err(Undeliverable::InvalidPayload { .. })
        );
    }

    #[test]
    fn producers_without_mapping_are_unmapped() {
        for producer in [PRODUCER_REMINDER, PRODUCER_INVESTMENT, "weather"] {
            assert_eq!(
                encode(&event(producer, serde_json::json!(1))),
                Err(Undeliverable::Unmapped(producer.to_string()))
            );
        }
    }
}
