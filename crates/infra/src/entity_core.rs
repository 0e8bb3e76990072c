//! Command execution pipeline for one entity type.
//!
//! The `EntityCore` owns one actor task per live identity. Commands for an identity are
//! queued on the instance's mailbox and processed one at a time, in arrival order:
//!
//! ```text
//! handle(id, command, metadata)
//!   ↓
//! 1. Route to the identity's instance (spawn it on first use)
//!   ↓
//! 2. Resolve state (cold load: replay the stream from the empty state, then cache)
//!   ↓
//! 3. Decide: run the command handler (pure) and fold emitted events
//!   ↓
//! 4. Persist: append with ExpectedVersion::Exact(cached version)
//!   ↓
//! 5. Commit the new state to the cache, publish, dispatch side effects
//!   ↓
//! 6. Reply
//! ```
//!
//! Failures leave the cache untouched. A concurrency conflict drops the cache so the next
//! command reloads from the store. Instances retire after the configured idle timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use eventide_core::{DomainError, EntityId, EventId, ExpectedVersion, Message, Metadata};
use eventide_events::{Behavior, CommandContext, EventBus, EventEnvelope, EventSourcedEntity, execute};

use crate::command_sender::CommandSender;
use crate::config::RuntimeConfig;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Failure surfaced to the submitter of a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command handler rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Loading or appending failed; nothing was committed.
    #[error("event store error: {0}")]
    Store(#[from] EventStoreError),

    /// A stored event could not be decoded into the entity's event family.
    #[error("cannot decode stored event: {0}")]
    Decode(String),

    #[error("cannot decode command for '{entity_type}': {message}")]
    InvalidCommand { entity_type: String, message: String },

    #[error("cannot encode reply: {0}")]
    Encode(String),

    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),

    /// The instance stopped before replying (runtime shutting down).
    #[error("entity instance '{0}' stopped before replying")]
    InstanceGone(String),
}

impl CommandError {
    /// Stable machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Domain(e) => e.code(),
            CommandError::Store(_) => "store",
            CommandError::Decode(_) => "decode",
            CommandError::InvalidCommand { .. } => "invalid_command",
            CommandError::Encode(_) => "encode",
            CommandError::UnknownEntityType(_) => "unknown_entity_type",
            CommandError::InstanceGone(_) => "unavailable",
        }
    }
}

type CommandResult<A> = Result<<A as EventSourcedEntity>::Reply, CommandError>;
type StateResult<A> = Result<<A as EventSourcedEntity>::State, CommandError>;

enum InstanceMessage<A: EventSourcedEntity> {
    Handle {
        command: A::Command,
        ctx: CommandContext,
        reply: oneshot::Sender<CommandResult<A>>,
    },
    State {
        reply: oneshot::Sender<StateResult<A>>,
    },
}

type Mailbox<A> = mpsc::UnboundedSender<InstanceMessage<A>>;

/// Cached state of one identity plus the stream version it reflects.
struct Loaded<A: EventSourcedEntity> {
    state: A::State,
    version: u64,
}

struct Shared<A: EventSourcedEntity, S, B> {
    behavior: Behavior<A>,
    store: S,
    bus: B,
    sender: Arc<dyn CommandSender>,
    config: RuntimeConfig,
    instances: Mutex<HashMap<EntityId, Mailbox<A>>>,
}

/// Runs commands of entity type `A` against store `S`, publishing to bus `B`.
pub struct EntityCore<A: EventSourcedEntity, S, B> {
    shared: Arc<Shared<A, S, B>>,
}

impl<A: EventSourcedEntity, S, B> Clone for EntityCore<A, S, B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: EventSourcedEntity, S, B> core::fmt::Debug for EntityCore<A, S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntityCore")
            .field("entity_type", &A::ENTITY_TYPE)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<A, S, B> EntityCore<A, S, B>
where
    A: EventSourcedEntity,
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(
        behavior: Behavior<A>,
        store: S,
        bus: B,
        sender: Arc<dyn CommandSender>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                behavior,
                store,
                bus,
                sender,
                config,
                instances: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn entity_type(&self) -> &'static str {
        A::ENTITY_TYPE
    }

    /// Handle one command for `id` and wait for its reply.
    ///
    /// Dropping the returned future does not cancel the command: the instance runs it
    /// to completion.
    pub async fn handle(
        &self,
        id: EntityId,
        command: A::Command,
        metadata: Metadata,
    ) -> Result<A::Reply, CommandError> {
        let (reply, rx) = oneshot::channel();
        let ctx = CommandContext::new(id.clone(), metadata);
        self.route(&id, InstanceMessage::Handle {
            command,
            ctx,
            reply,
        });
        rx.await
            .map_err(|_| CommandError::InstanceGone(id.to_string()))?
    }

    /// Current state of `id`, loading it if the instance is cold.
    pub async fn state(&self, id: EntityId) -> Result<A::State, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.route(&id, InstanceMessage::State { reply });
        rx.await
            .map_err(|_| CommandError::InstanceGone(id.to_string()))?
    }

    /// Number of identities with a live instance.
    pub fn live_instances(&self) -> usize {
        self.shared.lock_instances().len()
    }

    /// Close every mailbox. Instances finish their queued commands and stop.
    pub fn shutdown(&self) {
        self.shared.lock_instances().clear();
    }

    fn route(&self, id: &EntityId, message: InstanceMessage<A>) {
        let mut instances = self.shared.lock_instances();

        let message = match instances.get(id) {
            Some(mailbox) => match mailbox.send(message) {
                Ok(()) => return,
                // The instance stopped without retiring itself; replace it.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // `rx` is alive, so this cannot fail.
        let _ = tx.send(message);
        instances.insert(id.clone(), tx);

        let span = tracing::info_span!(
            "entity_instance",
            entity_type = A::ENTITY_TYPE,
            entity_id = %id
        );
        tokio::spawn(run_instance(Arc::clone(&self.shared), id.clone(), rx).instrument(span));
    }
}

impl<A: EventSourcedEntity, S, B> Shared<A, S, B> {
    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<EntityId, Mailbox<A>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `id` from the routing table unless a message raced in.
    fn retire(
        &self,
        id: &EntityId,
        rx: &mut mpsc::UnboundedReceiver<InstanceMessage<A>>,
    ) -> Option<InstanceMessage<A>> {
        let mut instances = self.lock_instances();
        match rx.try_recv() {
            Ok(message) => Some(message),
            Err(_) => {
                instances.remove(id);
                None
            }
        }
    }
}

async fn run_instance<A, S, B>(
    shared: Arc<Shared<A, S, B>>,
    id: EntityId,
    mut rx: mpsc::UnboundedReceiver<InstanceMessage<A>>,
) where
    A: EventSourcedEntity,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut cache: Option<Loaded<A>> = None;

    loop {
        let next = match shared.config.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, rx.recv()).await {
                Ok(message) => message,
                Err(_elapsed) => match shared.retire(&id, &mut rx) {
                    Some(message) => Some(message),
                    None => {
                        tracing::debug!("instance idle, retiring");
                        break;
                    }
                },
            },
            None => rx.recv().await,
        };

        let Some(message) = next else {
            // Mailbox closed (shutdown).
            break;
        };

        match message {
            InstanceMessage::Handle {
                command,
                ctx,
                reply,
            } => {
                let span = tracing::info_span!(
                    "command",
                    entity_type = A::ENTITY_TYPE,
                    entity_id = %id,
                    command_type = command.message_type(),
                    command_id = %ctx.command_id()
                );
                let result = shared
                    .handle_command(&id, &mut cache, command, &ctx)
                    .instrument(span)
                    .await;
                // The caller may have stopped waiting; the command still completed.
                let _ = reply.send(result);
            }
            InstanceMessage::State { reply } => {
                let result = match shared.ensure_loaded(&id, &mut cache).await {
                    Ok(loaded) => Ok(loaded.state.clone()),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
        }
    }
}

impl<A, S, B> Shared<A, S, B>
where
    A: EventSourcedEntity,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    async fn ensure_loaded<'c>(
        &self,
        id: &EntityId,
        cache: &'c mut Option<Loaded<A>>,
    ) -> Result<&'c Loaded<A>, CommandError> {
        if cache.is_none() {
            *cache = Some(self.load(id).await?);
        }
        cache
            .as_ref()
            .ok_or_else(|| CommandError::InstanceGone(id.to_string()))
    }

    async fn load(&self, id: &EntityId) -> Result<Loaded<A>, CommandError> {
        let history = self.store.load_stream(A::ENTITY_TYPE, id).await?;
        validate_loaded_stream(A::ENTITY_TYPE, id, &history)?;

        let events = history
            .iter()
            .map(|stored| serde_json::from_value::<A::Event>(stored.payload.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CommandError::Decode(e.to_string()))?;

        let state = self.behavior.replay(&events);
        let version = history.last().map(|e| e.sequence_number).unwrap_or(0);
        tracing::debug!(events = events.len(), version, "replayed stream");

        Ok(Loaded { state, version })
    }

    async fn handle_command(
        &self,
        id: &EntityId,
        cache: &mut Option<Loaded<A>>,
        command: A::Command,
        ctx: &CommandContext,
    ) -> Result<A::Reply, CommandError> {
        let Loaded { state, version } = match cache.take() {
            Some(loaded) => loaded,
            None => self.load(id).await?,
        };

        let execution = match execute(&self.behavior, &state, command, ctx) {
            Ok(execution) => execution,
            Err(err) => {
                tracing::debug!(code = err.code(), error = %err, "command rejected");
                *cache = Some(Loaded { state, version });
                return Err(err.into());
            }
        };

        if execution.events.is_empty() {
            *cache = Some(Loaded { state, version });
            return Ok(execution.reply);
        }

        let uncommitted = match execution
            .events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    A::ENTITY_TYPE,
                    id.clone(),
                    EventId::new(),
                    ctx.metadata().clone(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(uncommitted) => uncommitted,
            Err(err) => {
                *cache = Some(Loaded { state, version });
                return Err(err.into());
            }
        };

        let committed = match self
            .store
            .append(uncommitted, ExpectedVersion::Exact(version))
            .await
        {
            Ok(committed) => committed,
            Err(err @ EventStoreError::Concurrency(_)) => {
                tracing::warn!(error = %err, "stale instance state, reloading on next command");
                return Err(err.into());
            }
            Err(err) => {
                tracing::warn!(error = %err, "append failed");
                *cache = Some(Loaded { state, version });
                return Err(err.into());
            }
        };

        let new_version = committed.last().map(|e| e.sequence_number).unwrap_or(version);
        *cache = Some(Loaded {
            state: execution.state,
            version: new_version,
        });
        tracing::debug!(count = committed.len(), version = new_version, "events appended");

        self.publish(&committed);

        for side_effect in execution.side_effects {
            tracing::debug!(
                target_type = side_effect.entity_type(),
                target_id = %side_effect.entity_id(),
                "dispatching side effect"
            );
            self.sender.send(side_effect);
        }

        Ok(execution.reply)
    }

    fn publish(&self, committed: &[StoredEvent]) {
        for stored in committed {
            match self.bus.publish(stored.to_envelope()) {
                Ok(()) => tracing::debug!(
                    sequence_number = stored.sequence_number,
                    global_position = stored.global_position,
                    event_type = %stored.event_type,
                    "event published"
                ),
                Err(err) => tracing::warn!(
                    sequence_number = stored.sequence_number,
                    error = %err,
                    "publish failed; subscribers catch up from the store"
                ),
            }
        }
    }
}

fn validate_loaded_stream(
    entity_type: &str,
    id: &EntityId,
    stream: &[StoredEvent],
) -> Result<(), CommandError> {
    // Ensure the stream belongs to this identity and is gapless.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.entity_type != entity_type || &e.entity_id != id {
            return Err(EventStoreError::InvalidAppend(format!(
                "loaded stream contains a foreign event at index {idx}"
            ))
            .into());
        }
        if e.sequence_number != last + 1 {
            return Err(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))
            .into());
        }
        last = e.sequence_number;
    }
    Ok(())
}
