//! The outcome of handling one command.
//!
//! A command handler returns exactly one [`Effect`]:
//!
//! - **fail**: a [`DomainError`]; nothing is appended and state is unchanged
//! - **reply**: a direct reply computed from current state; nothing is appended
//! - **persist**: one or more events to append, a function building the reply from the
//!   *post*-apply state, and zero or more [`SideEffect`]s
//!
//! ```ignore
//! Effect::emit(CounterEvent::ValueIncreased(ValueIncreased { value }))
//!     .then_send(SideEffect::to::<Counter>(id, &increase)?)
//!     .then_reply(|_| CounterReply::Done)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use eventide_core::{DomainError, EntityId, Metadata};

use crate::EventSourcedEntity;

/// Builds the reply from the state after the emitted events were applied.
pub type ReplyFn<A> = Box<
    dyn FnOnce(&<A as EventSourcedEntity>::State) -> <A as EventSourcedEntity>::Reply + Send,
>;

/// A fire-and-forget command addressed to another entity instance.
///
/// Side effects are dispatched only after the emitting command's events were appended.
/// Their outcome never reaches the original caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
    entity_type: String,
    entity_id: EntityId,
    command: JsonValue,
    #[serde(default)]
    metadata: Metadata,
}

impl SideEffect {
    pub fn new(entity_type: impl Into<String>, entity_id: EntityId, command: JsonValue) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            command,
            metadata: Metadata::new(),
        }
    }

    /// Typed constructor: address `command` to entity `A` at `entity_id`.
    pub fn to<A>(entity_id: EntityId, command: &A::Command) -> Result<Self, serde_json::Error>
    where
        A: EventSourcedEntity,
    {
        Ok(Self::new(
            A::ENTITY_TYPE,
            entity_id,
            serde_json::to_value(command)?,
        ))
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn command(&self) -> &JsonValue {
        &self.command
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Outcome of handling one command.
pub enum Effect<A: EventSourcedEntity> {
    Fail(DomainError),
    Reply(A::Reply),
    Persist {
        events: Vec<A::Event>,
        reply: ReplyFn<A>,
        side_effects: Vec<SideEffect>,
    },
}

impl<A: EventSourcedEntity> Effect<A> {
    pub fn reply(reply: A::Reply) -> Self {
        Effect::Reply(reply)
    }

    /// Fail the command with a validation error.
    pub fn fail(message: impl Into<String>) -> Self {
        Effect::Fail(DomainError::validation(message))
    }

    pub fn error(error: DomainError) -> Self {
        Effect::Fail(error)
    }

    /// Start a persist effect with a single event.
    pub fn emit(event: A::Event) -> PersistBuilder<A> {
        Self::emit_all(vec![event])
    }

    pub fn emit_all(events: Vec<A::Event>) -> PersistBuilder<A> {
        PersistBuilder {
            events,
            side_effects: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Effect::Fail(_))
    }
}

impl<A: EventSourcedEntity> core::fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Effect::Fail(err) => f.debug_tuple("Fail").field(err).finish(),
            Effect::Reply(reply) => f.debug_tuple("Reply").field(reply).finish(),
            Effect::Persist {
                events,
                side_effects,
                ..
            } => f
                .debug_struct("Persist")
                .field("events", events)
                .field("side_effects", side_effects)
                .finish_non_exhaustive(),
        }
    }
}

/// Events decided by a handler, waiting for side effects and a reply.
#[must_use = "a persist effect needs a reply: call `then_reply`"]
pub struct PersistBuilder<A: EventSourcedEntity> {
    events: Vec<A::Event>,
    side_effects: Vec<SideEffect>,
}

impl<A: EventSourcedEntity> PersistBuilder<A> {
    pub fn then_send(mut self, side_effect: SideEffect) -> Self {
        self.side_effects.push(side_effect);
        self
    }

    pub fn then_reply<F>(self, reply: F) -> Effect<A>
    where
        F: FnOnce(&A::State) -> A::Reply + Send + 'static,
    {
        Effect::Persist {
            events: self.events,
            reply: Box::new(reply),
            side_effects: self.side_effects,
        }
    }
}
