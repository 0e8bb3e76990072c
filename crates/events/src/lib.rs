//! Entity behavior, effects, envelopes and delivery mechanics.
//!
//! This crate is pure: no IO, no async. It defines how an entity type declares its
//! command and event handlers, what a command handler may decide ([`Effect`]), and the
//! contracts consumers of committed events implement ([`Projection`], [`Action`]).
//! Running all of this against a store and a bus is `eventide-infra`'s job.

pub mod action;
pub mod behavior;
pub mod bus;
pub mod command;
pub mod effect;
pub mod entity;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;
pub mod source;

pub use action::Action;
pub use behavior::{Behavior, BehaviorBuilder, Execution, execute};
pub use bus::{EventBus, Subscription};
pub use command::CommandContext;
pub use effect::{Effect, PersistBuilder, SideEffect};
pub use entity::EventSourcedEntity;
pub use envelope::EventEnvelope;
pub use event::{Event, decode_event};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::{Applied, DeliveryError, Projection, UpdateContext};
pub use runner::{CursorCheck, SubjectCursors, replay};
pub use source::{Sourced, SubscriptionFilter};
