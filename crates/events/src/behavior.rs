//! Explicit handler tables for an entity type, and pure command execution.
//!
//! Handlers are registered per payload type through [`BehaviorBuilder`] and validated
//! once, when [`Behavior::new`] runs:
//!
//! - two handlers for one command or event type are rejected
//! - every declared command type needs a command handler
//! - every declared event type needs an event handler
//!
//! Dispatch afterwards is a table lookup on the message's stable type name.

use std::collections::HashMap;

use eventide_core::{DomainError, Message, RegistrationError, Variant};

use crate::{CommandContext, Effect, EventSourcedEntity, SideEffect};

type CommandHandler<A> = Box<
    dyn Fn(
            &<A as EventSourcedEntity>::State,
            <A as EventSourcedEntity>::Command,
            &CommandContext,
        ) -> Effect<A>
        + Send
        + Sync,
>;

type EventHandler<A> = Box<
    dyn Fn(
            <A as EventSourcedEntity>::State,
            &<A as EventSourcedEntity>::Event,
        ) -> <A as EventSourcedEntity>::State
        + Send
        + Sync,
>;

/// Collects handlers during [`EventSourcedEntity::register`].
pub struct BehaviorBuilder<A: EventSourcedEntity> {
    commands: HashMap<&'static str, CommandHandler<A>>,
    events: HashMap<&'static str, EventHandler<A>>,
    errors: Vec<RegistrationError>,
}

impl<A: EventSourcedEntity> BehaviorBuilder<A> {
    fn new() -> Self {
        Self {
            commands: HashMap::new(),
            events: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Register the handler for command payload `C`.
    pub fn on_command<C, F>(&mut self, handler: F) -> &mut Self
    where
        C: Variant<A::Command>,
        F: Fn(&A::State, C, &CommandContext) -> Effect<A> + Send + Sync + 'static,
    {
        if !<A::Command as Message>::declared_types().contains(&C::TYPE) {
            self.errors.push(RegistrationError::UndeclaredMessage {
                owner: A::ENTITY_TYPE.to_string(),
                message_type: C::TYPE.to_string(),
            });
            return self;
        }
        if self.commands.contains_key(C::TYPE) {
            self.errors.push(RegistrationError::DuplicateCommandHandler {
                entity_type: A::ENTITY_TYPE.to_string(),
                command_type: C::TYPE.to_string(),
            });
            return self;
        }

        let boxed: CommandHandler<A> =
            Box::new(move |state: &A::State, command: A::Command, ctx: &CommandContext| {
                match C::take(command) {
                    Some(payload) => handler(state, payload, ctx),
                    None => Effect::error(DomainError::validation(format!(
                        "command routed to the '{}' handler has another type",
                        C::TYPE
                    ))),
                }
            });
        self.commands.insert(C::TYPE, boxed);
        self
    }

    /// Register the reducer step for event payload `E`.
    pub fn on_event<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: Variant<A::Event>,
        F: Fn(A::State, &E) -> A::State + Send + Sync + 'static,
    {
        if !<A::Event as Message>::declared_types().contains(&E::TYPE) {
            self.errors.push(RegistrationError::UndeclaredMessage {
                owner: A::ENTITY_TYPE.to_string(),
                message_type: E::TYPE.to_string(),
            });
            return self;
        }
        if self.events.contains_key(E::TYPE) {
            self.errors.push(RegistrationError::DuplicateEventHandler {
                entity_type: A::ENTITY_TYPE.to_string(),
                event_type: E::TYPE.to_string(),
            });
            return self;
        }

        let boxed: EventHandler<A> =
            Box::new(move |state: A::State, event: &A::Event| match E::peek(event) {
                Some(payload) => handler(state, payload),
                None => state,
            });
        self.events.insert(E::TYPE, boxed);
        self
    }
}

/// Validated handler tables of one entity type.
pub struct Behavior<A: EventSourcedEntity> {
    commands: HashMap<&'static str, CommandHandler<A>>,
    events: HashMap<&'static str, EventHandler<A>>,
}

impl<A: EventSourcedEntity> Behavior<A> {
    /// Run [`EventSourcedEntity::register`] and validate the resulting tables.
    pub fn new() -> Result<Self, RegistrationError> {
        let mut builder = BehaviorBuilder::<A>::new();
        A::register(&mut builder);

        if let Some(err) = builder.errors.into_iter().next() {
            return Err(err);
        }

        for command_type in <A::Command as Message>::declared_types() {
            if !builder.commands.contains_key(command_type) {
                return Err(RegistrationError::MissingCommandHandler {
                    entity_type: A::ENTITY_TYPE.to_string(),
                    command_type: command_type.to_string(),
                });
            }
        }
        for event_type in <A::Event as Message>::declared_types() {
            if !builder.events.contains_key(event_type) {
                return Err(RegistrationError::MissingEventHandler {
                    entity_type: A::ENTITY_TYPE.to_string(),
                    event_type: event_type.to_string(),
                });
            }
        }

        Ok(Self {
            commands: builder.commands,
            events: builder.events,
        })
    }

    /// Decide the effect of `command` against `state`.
    pub fn handle(&self, state: &A::State, command: A::Command, ctx: &CommandContext) -> Effect<A> {
        match self.commands.get(command.message_type()) {
            Some(handler) => handler(state, command, ctx),
            None => Effect::error(DomainError::validation(format!(
                "entity '{}' has no handler for command '{}'",
                A::ENTITY_TYPE,
                command.message_type()
            ))),
        }
    }

    /// Apply one event to `state`.
    pub fn apply(&self, state: A::State, event: &A::Event) -> A::State {
        match self.events.get(event.message_type()) {
            Some(handler) => handler(state, event),
            None => {
                // Unreachable after validation; keep the reducer total.
                tracing::error!(
                    entity_type = A::ENTITY_TYPE,
                    event_type = event.message_type(),
                    "no event handler registered"
                );
                state
            }
        }
    }

    /// Fold `events` onto `state` in order.
    pub fn fold_from<'a>(
        &self,
        state: A::State,
        events: impl IntoIterator<Item = &'a A::Event>,
    ) -> A::State {
        events.into_iter().fold(state, |s, e| self.apply(s, e))
    }

    /// Rebuild state from the empty state.
    pub fn replay<'a>(&self, events: impl IntoIterator<Item = &'a A::Event>) -> A::State {
        self.fold_from(A::empty_state(), events)
    }
}

impl<A: EventSourcedEntity> core::fmt::Debug for Behavior<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut commands: Vec<_> = self.commands.keys().collect();
        let mut events: Vec<_> = self.events.keys().collect();
        commands.sort();
        events.sort();
        f.debug_struct("Behavior")
            .field("entity_type", &A::ENTITY_TYPE)
            .field("commands", &commands)
            .field("events", &events)
            .finish()
    }
}

/// Result of executing one command in memory.
pub struct Execution<A: EventSourcedEntity> {
    pub events: Vec<A::Event>,
    pub state: A::State,
    pub reply: A::Reply,
    pub side_effects: Vec<SideEffect>,
}

impl<A: EventSourcedEntity> core::fmt::Debug for Execution<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Execution")
            .field("events", &self.events)
            .field("state", &self.state)
            .field("reply", &self.reply)
            .field("side_effects", &self.side_effects)
            .finish()
    }
}

/// Execute a command deterministically (no IO, no async).
///
/// 1. **Decide**: run the registered command handler against `state`
/// 2. **Evolve**: fold any emitted events onto a copy of `state`
/// 3. **Reply**: build the reply from the evolved state
///
/// `state` itself is never touched; persisting the events and committing the new state
/// is the caller's job.
pub fn execute<A>(
    behavior: &Behavior<A>,
    state: &A::State,
    command: A::Command,
    ctx: &CommandContext,
) -> Result<Execution<A>, DomainError>
where
    A: EventSourcedEntity,
{
    match behavior.handle(state, command, ctx) {
        Effect::Fail(err) => Err(err),
        Effect::Reply(reply) => Ok(Execution {
            events: Vec::new(),
            state: state.clone(),
            reply,
            side_effects: Vec::new(),
        }),
        Effect::Persist {
            events,
            reply,
            side_effects,
        } => {
            let next = behavior.fold_from(state.clone(), &events);
            let reply = reply(&next);
            Ok(Execution {
                events,
                state: next,
                reply,
                side_effects,
            })
        }
    }
}
