//! Event-sourced entity declaration.

use serde::Serialize;
use serde::de::DeserializeOwned;

use eventide_core::Message;

use crate::{BehaviorBuilder, Event};

/// An event-sourced entity type.
///
/// An implementation is a *declaration*, not an instance: it names the entity type,
/// its state, its closed command and event families, and registers one handler per
/// command type and one per event type.
///
/// - Command handlers are pure: `(&State, command, &CommandContext) -> Effect`.
/// - Event handlers form the reducer: `(State, &event) -> State`. They never fail and
///   never enforce invariants; replaying the same events always yields the same state.
///
/// The runtime owns the state. Instances are created lazily on the first command for an
/// identity and rebuilt by replaying the identity's stream from [`empty_state`].
///
/// [`empty_state`]: EventSourcedEntity::empty_state
pub trait EventSourcedEntity: Sized + Send + Sync + 'static {
    /// Stable entity type name (routing key and stream partition).
    const ENTITY_TYPE: &'static str;

    type State: Clone + core::fmt::Debug + Send + Sync + 'static;
    type Command: Message + Serialize + DeserializeOwned;
    type Event: Event;
    type Reply: core::fmt::Debug + Serialize + Send + 'static;

    /// State of an identity that has no events yet.
    fn empty_state() -> Self::State;

    /// Register command and event handlers.
    fn register(behavior: &mut BehaviorBuilder<Self>);
}
