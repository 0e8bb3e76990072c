use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use eventide_core::{EntityId, EventId, ExpectedVersion, Metadata};
use eventide_events::{Event, EventEnvelope};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Events go through this lifecycle:
///
/// 1. **Domain event**: emitted by a command handler's effect
/// 2. **UncommittedEvent**: serialized, wrapped with stream identity and command metadata
/// 3. **StoredEvent**: persisted with assigned `sequence_number` and `global_position`
/// 4. **EventEnvelope**: published to the bus and replayed to consumers
///
/// Use [`UncommittedEvent::from_typed`] to build one from a typed domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: EventId,
    pub entity_type: String,
    pub entity_id: EntityId,

    pub event_type: String,
    pub event_version: u32,
    pub metadata: Metadata,
    pub recorded_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// - `sequence_number` is per stream (`entity_type` + `entity_id`), starting at 1, no gaps.
/// - `global_position` is store-wide, starting at 1, strictly increasing in commit order.
///
/// Once assigned, neither ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub entity_type: String,
    pub entity_id: EntityId,

    /// Monotonically increasing position in the entity stream.
    pub sequence_number: u64,
    /// Monotonically increasing position across every stream of the store.
    pub global_position: u64,

    pub event_type: String,
    pub event_version: u32,
    pub metadata: Metadata,
    pub recorded_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an envelope for publication or replay.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.entity_type.clone(),
            self.entity_id.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.payload.clone(),
        )
        .with_global_position(self.global_position)
        .with_metadata(self.metadata.clone())
        .with_recorded_at(self.recorded_at)
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to domain errors
/// (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("entity type mismatch: {0}")]
    EntityTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

impl EventStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            EventStoreError::Concurrency(_) => "concurrency",
            EventStoreError::EntityTypeMismatch(_) => "entity_type_mismatch",
            EventStoreError::InvalidAppend(_) => "invalid_append",
            EventStoreError::Unavailable(_) => "unavailable",
        }
    }
}

/// Append-only event store.
///
/// Events are organized into **streams**, one per entity instance, keyed by
/// `(entity_type, entity_id)`. Within a stream, events have sequence numbers 1, 2, 3, ...
///
/// `append()`:
/// - requires every event of the batch to target the same stream
/// - checks optimistic concurrency against the current stream version
/// - assigns `sequence_number`s starting at `current_version + 1` and the next
///   `global_position`s
/// - persists the batch atomically (all or nothing)
///
/// `load_stream()` returns the stream in sequence order (empty if it does not exist).
///
/// `read_all_after()` returns every event of an entity type whose `global_position`
/// is greater than `position`, in commit order. Passing 0 replays from the beginning.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn load_stream(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn read_all_after(
        &self,
        entity_type: &str,
        position: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version).await
    }

    async fn load_stream(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(entity_type, entity_id).await
    }

    async fn read_all_after(
        &self,
        entity_type: &str,
        position: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).read_all_after(entity_type, position).await
    }
}

impl UncommittedEvent {
    /// Build from a typed domain event.
    ///
    /// Keeps infra decoupled from business, while still capturing the event metadata
    /// needed for later deserialization.
    pub fn from_typed<E>(
        entity_type: impl Into<String>,
        entity_id: EntityId,
        event_id: EventId,
        metadata: Metadata,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: Event,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            entity_type: entity_type.into(),
            entity_id,
            event_type: event.message_type().to_string(),
            event_version: event.version(),
            metadata,
            recorded_at: Utc::now(),
            payload,
        })
    }
}
