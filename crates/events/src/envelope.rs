use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use eventide_core::{EntityId, EventId, Metadata};

/// Envelope for a committed event, as delivered to consumers.
///
/// Notes:
/// - `subject` is the identity of the entity instance that emitted the event.
/// - **Append-only**: `sequence_number` is monotonically increasing per stream, starting at 1.
/// - `global_position` orders events across all streams of the store (0 when unknown).
/// - `metadata` is the metadata of the command that emitted the event.
/// - `payload` is the domain-agnostic event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,

    entity_type: String,
    subject: EntityId,

    /// Monotonically increasing position in the entity stream.
    sequence_number: u64,
    global_position: u64,

    event_type: String,
    metadata: Metadata,
    recorded_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: EventId,
        entity_type: impl Into<String>,
        subject: EntityId,
        sequence_number: u64,
        event_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            entity_type: entity_type.into(),
            subject,
            sequence_number,
            global_position: 0,
            event_type: event_type.into(),
            metadata: Metadata::new(),
            recorded_at: Utc::now(),
            payload,
        }
    }

    pub fn with_global_position(mut self, global_position: u64) -> Self {
        self.global_position = global_position;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn subject(&self) -> &EntityId {
        &self.subject
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn global_position(&self) -> u64 {
        self.global_position
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Deserialize the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
