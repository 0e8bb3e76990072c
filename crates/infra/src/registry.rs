//! Entity type registry: JSON command submission and side-effect routing.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::runtime::Handle;

use eventide_core::{EntityId, Metadata, RegistrationError};
use eventide_events::{Behavior, EventBus, EventEnvelope, EventSourcedEntity, SideEffect};

use crate::command_sender::CommandSender;
use crate::config::RuntimeConfig;
use crate::entity_core::{CommandError, EntityCore};
use crate::event_store::EventStore;

/// Type-erased entity core addressed by entity type name.
#[async_trait]
pub trait DynEntityCore: Send + Sync {
    fn entity_type(&self) -> &'static str;

    /// Decode `command` into the entity's command family, handle it and encode the reply.
    async fn submit(
        &self,
        id: EntityId,
        command: JsonValue,
        metadata: Metadata,
    ) -> Result<JsonValue, CommandError>;

    fn live_instances(&self) -> usize;

    fn shutdown(&self);
}

#[async_trait]
impl<A, S, B> DynEntityCore for EntityCore<A, S, B>
where
    A: EventSourcedEntity,
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    fn entity_type(&self) -> &'static str {
        A::ENTITY_TYPE
    }

    async fn submit(
        &self,
        id: EntityId,
        command: JsonValue,
        metadata: Metadata,
    ) -> Result<JsonValue, CommandError> {
        let command: A::Command =
            serde_json::from_value(command).map_err(|e| CommandError::InvalidCommand {
                entity_type: A::ENTITY_TYPE.to_string(),
                message: e.to_string(),
            })?;
        let reply = self.handle(id, command, metadata).await?;
        serde_json::to_value(&reply).map_err(|e| CommandError::Encode(e.to_string()))
    }

    fn live_instances(&self) -> usize {
        EntityCore::live_instances(self)
    }

    fn shutdown(&self) {
        EntityCore::shutdown(self)
    }
}

type CoreMap = RwLock<HashMap<&'static str, Arc<dyn DynEntityCore>>>;

/// Every registered entity type of one runtime, sharing a store and a bus.
pub struct EntityRegistry<S, B> {
    store: S,
    bus: B,
    config: RuntimeConfig,
    cores: Arc<CoreMap>,
}

impl<S, B> EntityRegistry<S, B>
where
    S: EventStore + Clone + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + Clone + 'static,
{
    pub fn new(store: S, bus: B, config: RuntimeConfig) -> Self {
        Self {
            store,
            bus,
            config,
            cores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate `A`'s behavior and bring its entity core online.
    pub fn register<A: EventSourcedEntity>(
        &self,
    ) -> Result<EntityCore<A, S, B>, RegistrationError> {
        let behavior = Behavior::<A>::new()?;

        let mut cores = self.cores.write().unwrap_or_else(PoisonError::into_inner);
        if cores.contains_key(A::ENTITY_TYPE) {
            return Err(RegistrationError::DuplicateEntityType(
                A::ENTITY_TYPE.to_string(),
            ));
        }

        let core = EntityCore::new(
            behavior,
            self.store.clone(),
            self.bus.clone(),
            Arc::new(self.sender()),
            self.config,
        );
        cores.insert(A::ENTITY_TYPE, Arc::new(core.clone()));
        tracing::info!(entity_type = A::ENTITY_TYPE, "entity type registered");

        Ok(core)
    }

    /// Submit a JSON command to `entity_type`/`id`.
    pub async fn submit(
        &self,
        entity_type: &str,
        id: &str,
        command: JsonValue,
        metadata: Metadata,
    ) -> Result<JsonValue, CommandError> {
        let id = EntityId::parse(id)?;
        let core = self
            .core(entity_type)
            .ok_or_else(|| CommandError::UnknownEntityType(entity_type.to_string()))?;
        core.submit(id, command, metadata).await
    }

    pub fn core(&self, entity_type: &str) -> Option<Arc<dyn DynEntityCore>> {
        self.cores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_type)
            .cloned()
    }

    pub fn entity_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self
            .cores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        types.sort_unstable();
        types
    }

    /// Sender that routes side effects to this registry's cores.
    pub fn sender(&self) -> RegistrySender {
        RegistrySender {
            cores: Arc::downgrade(&self.cores),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn shutdown(&self) {
        for core in self
            .cores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            core.shutdown();
        }
    }
}

/// Routes side effects to registered entity cores as detached tasks.
///
/// Holds the registry weakly, so cores referencing it do not keep it alive.
#[derive(Clone)]
pub struct RegistrySender {
    cores: Weak<CoreMap>,
}

impl core::fmt::Debug for RegistrySender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistrySender").finish_non_exhaustive()
    }
}

impl CommandSender for RegistrySender {
    fn send(&self, side_effect: SideEffect) {
        let Some(cores) = self.cores.upgrade() else {
            tracing::warn!(
                entity_type = side_effect.entity_type(),
                "registry dropped, discarding side effect"
            );
            return;
        };

        let core = cores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(side_effect.entity_type())
            .cloned();
        let Some(core) = core else {
            tracing::warn!(
                entity_type = side_effect.entity_type(),
                "side effect targets an unregistered entity type"
            );
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(
                entity_type = side_effect.entity_type(),
                "no async runtime available, discarding side effect"
            );
            return;
        };

        runtime.spawn(async move {
            let entity_type = side_effect.entity_type().to_string();
            let entity_id = side_effect.entity_id().clone();
            let (command, metadata) = (
                side_effect.command().clone(),
                side_effect.metadata().clone(),
            );
            if let Err(err) = core.submit(entity_id.clone(), command, metadata).await {
                tracing::warn!(
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    code = err.code(),
                    error = %err,
                    "side effect command failed"
                );
            }
        });
    }
}
