//! Infrastructure layer: event store, entity cores, subscriptions, views, config.

pub mod command_sender;
pub mod config;
pub mod entity_core;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod registry;
pub mod subscription;
pub mod workers;

pub use command_sender::{CommandSender, DroppingSender, RecordingSender};
pub use config::{ConfigError, RetryPolicy, RuntimeConfig};
pub use entity_core::{CommandError, EntityCore};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use registry::{DynEntityCore, EntityRegistry, RegistrySender};
pub use subscription::{AttachError, SubscriptionRouter};
