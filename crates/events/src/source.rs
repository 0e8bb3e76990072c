use serde::{Deserialize, Serialize};

use eventide_core::EntityId;

use crate::{EventEnvelope, EventSourcedEntity};

/// Messages that originate from one entity stream.
///
/// Infrastructure uses this to route, filter and deduplicate deliveries without
/// knowing the payload type. `EventEnvelope` implements it.
pub trait Sourced {
    fn entity_type(&self) -> &str;

    fn subject(&self) -> &EntityId;

    fn sequence_number(&self) -> u64;

    fn event_type(&self) -> &str;
}

impl<E> Sourced for EventEnvelope<E> {
    fn entity_type(&self) -> &str {
        EventEnvelope::entity_type(self)
    }

    fn subject(&self) -> &EntityId {
        EventEnvelope::subject(self)
    }

    fn sequence_number(&self) -> u64 {
        EventEnvelope::sequence_number(self)
    }

    fn event_type(&self) -> &str {
        EventEnvelope::event_type(self)
    }
}

/// Selects the events of one entity type, optionally narrowed to some event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    entity_type: String,
    /// Empty means every event type of the entity.
    #[serde(default)]
    event_types: Vec<String>,
}

impl SubscriptionFilter {
    pub fn entity(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            event_types: Vec::new(),
        }
    }

    pub fn of<A: EventSourcedEntity>() -> Self {
        Self::entity(A::ENTITY_TYPE)
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    pub fn matches<S: Sourced + ?Sized>(&self, message: &S) -> bool {
        message.entity_type() == self.entity_type
            && (self.event_types.is_empty()
                || self.event_types.iter().any(|t| t == message.event_type()))
    }
}
