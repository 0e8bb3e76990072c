use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use eventide_core::Message;

use crate::{DeliveryError, EventEnvelope, EventSourcedEntity};

/// A domain event family.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
///
/// The stable event type name comes from [`Message::message_type`]; the payload is
/// persisted as JSON through serde.
pub trait Event: Message + Serialize + DeserializeOwned {
    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }
}

/// Decode a committed envelope into the typed event family of entity `A`.
///
/// Fails with a non-retryable [`DeliveryError::Decode`] when the envelope was produced by
/// another entity type or its payload does not match the family.
pub fn decode_event<A>(envelope: &EventEnvelope<JsonValue>) -> Result<A::Event, DeliveryError>
where
    A: EventSourcedEntity,
{
    if envelope.entity_type() != A::ENTITY_TYPE {
        return Err(DeliveryError::Decode {
            event_type: envelope.event_type().to_string(),
            message: format!(
                "envelope belongs to '{}', expected '{}'",
                envelope.entity_type(),
                A::ENTITY_TYPE
            ),
        });
    }
    envelope.decode::<A::Event>().map_err(|e| DeliveryError::Decode {
        event_type: envelope.event_type().to_string(),
        message: e.to_string(),
    })
}
