use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use eventide_core::{EntityId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    entity_type: String,
    entity_id: EntityId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Every committed event in commit order (`global_position` = index + 1).
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Number of events committed across all streams.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let key = StreamKey {
            entity_type: first.entity_type.clone(),
            entity_id: first.entity_id.clone(),
        };
        for (idx, e) in events.iter().enumerate() {
            if e.entity_type != key.entity_type {
                return Err(EventStoreError::EntityTypeMismatch(format!(
                    "batch contains multiple entity types (index {idx})"
                )));
            }
            if e.entity_id != key.entity_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple entity ids (index {idx})"
                )));
            }
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Assign positions and append (append-only).
        let mut next = current + 1;
        let mut position = log.len() as u64 + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                entity_type: e.entity_type,
                entity_id: e.entity_id,
                sequence_number: next,
                global_position: position,
                event_type: e.event_type,
                event_version: e.event_version,
                metadata: e.metadata,
                recorded_at: e.recorded_at,
                payload: e.payload,
            };
            next += 1;
            position += 1;
            stream.push(stored.clone());
            log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    async fn load_stream(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.clone(),
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    async fn read_all_after(
        &self,
        entity_type: &str,
        position: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let start = usize::try_from(position).unwrap_or(usize::MAX).min(inner.log.len());
        Ok(inner.log[start..]
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::{EventId, Metadata};
    use serde_json::json;

    fn event(entity_type: &str, id: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: EventId::new(),
            entity_type: entity_type.to_string(),
            entity_id: EntityId::new(id),
            event_type: "ValueIncreased".to_string(),
            event_version: 1,
            metadata: Metadata::new(),
            recorded_at: chrono::Utc::now(),
            payload: json!({"ValueIncreased": {"value": 1}}),
        }
    }

    #[tokio::test]
    async fn assigns_sequence_and_global_positions() {
        let store = InMemoryEventStore::new();
        let a = store
            .append(vec![event("counter", "a"), event("counter", "a")], ExpectedVersion::Exact(0))
            .await
            .unwrap();
        let b = store
            .append(vec![event("counter", "b")], ExpectedVersion::Exact(0))
            .await
            .unwrap();

        assert_eq!(
            a.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(b[0].sequence_number, 1);
        assert_eq!(b[0].global_position, 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        store
            .append(vec![event("counter", "a")], ExpectedVersion::Exact(0))
            .await
            .unwrap();
        let err = store
            .append(vec![event("counter", "a")], ExpectedVersion::Exact(0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "concurrency");
        assert_eq!(
            store.load_stream("counter", &EntityId::new("a")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(vec![event("counter", "a"), event("counter", "b")], ExpectedVersion::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn read_all_after_filters_by_entity_type_and_position() {
        let store = InMemoryEventStore::new();
        store
            .append(vec![event("counter", "a")], ExpectedVersion::Any)
            .await
            .unwrap();
        store
            .append(vec![event("customer", "C1")], ExpectedVersion::Any)
            .await
            .unwrap();
        store
            .append(vec![event("counter", "a")], ExpectedVersion::Any)
            .await
            .unwrap();

        let all = store.read_all_after("counter", 0).await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.global_position).collect::<Vec<_>>(),
            vec![1, 3]
        );
        let tail = store.read_all_after("counter", 1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].sequence_number, 2);
    }
}
