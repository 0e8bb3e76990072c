use serde::{Deserialize, Serialize};

use eventide_core::{EntityId, impl_message};
use eventide_events::{BehaviorBuilder, CommandContext, Effect, Event, EventSourcedEntity, SideEffect};

/// Metadata key checked by `IncreaseWithConditional`.
pub const DOUBLE_INCREASE_KEY: &str = "myKey";

/// Metadata value that makes `IncreaseWithConditional` double its increment.
pub const DOUBLE_INCREASE_VALUE: &str = "myValue";

/// Counter state. Never negative through commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub value: i64,
}

/// Command: Increase (value must be >= 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Increase {
    pub value: i64,
}

/// Command: IncreaseWithSideEffect.
///
/// Increases by `value`, then asks the same counter to increase by `2 * value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreaseWithSideEffect {
    pub value: i64,
}

/// Command: IncreaseWithConditional.
///
/// Increases by `2 * value` when the command metadata carries
/// [`DOUBLE_INCREASE_KEY`] = [`DOUBLE_INCREASE_VALUE`], by `value` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreaseWithConditional {
    pub value: i64,
}

/// Command: Decrease (value must be <= 0; it is added to the counter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decrease {
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reset {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCurrentCounter {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterCommand {
    Increase(Increase),
    IncreaseWithSideEffect(IncreaseWithSideEffect),
    IncreaseWithConditional(IncreaseWithConditional),
    Decrease(Decrease),
    Reset(Reset),
    GetCurrentCounter(GetCurrentCounter),
}

impl_message!(CounterCommand {
    Increase(Increase) => "Increase",
    IncreaseWithSideEffect(IncreaseWithSideEffect) => "IncreaseWithSideEffect",
    IncreaseWithConditional(IncreaseWithConditional) => "IncreaseWithConditional",
    Decrease(Decrease) => "Decrease",
    Reset(Reset) => "Reset",
    GetCurrentCounter(GetCurrentCounter) => "GetCurrentCounter",
});

/// Event: ValueIncreased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueIncreased {
    pub value: i64,
}

/// Event: ValueDecreased (`value` is the signed, non-positive delta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDecreased {
    pub value: i64,
}

/// Event: ValueReset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueReset {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterEvent {
    ValueIncreased(ValueIncreased),
    ValueDecreased(ValueDecreased),
    ValueReset(ValueReset),
}

impl_message!(CounterEvent {
    ValueIncreased(ValueIncreased) => "ValueIncreased",
    ValueDecreased(ValueDecreased) => "ValueDecreased",
    ValueReset(ValueReset) => "ValueReset",
});

impl Event for CounterEvent {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCounter {
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterReply {
    Done,
    Current(CurrentCounter),
}

/// Entity: Counter.
#[derive(Debug, Clone, Copy)]
pub struct Counter;

impl EventSourcedEntity for Counter {
    const ENTITY_TYPE: &'static str = "counter";

    type State = CounterState;
    type Command = CounterCommand;
    type Event = CounterEvent;
    type Reply = CounterReply;

    fn empty_state() -> CounterState {
        CounterState::default()
    }

    fn register(b: &mut BehaviorBuilder<Self>) {
        b.on_command(Self::increase)
            .on_command(Self::increase_with_side_effect)
            .on_command(Self::increase_with_conditional)
            .on_command(Self::decrease)
            .on_command(Self::reset)
            .on_command(Self::get_current_counter)
            .on_event(Self::value_increased)
            .on_event(Self::value_decreased)
            .on_event(Self::value_reset);
    }
}

impl Counter {
    fn ensure_increment(state: &CounterState, value: i64) -> Result<(), Effect<Counter>> {
        if value < 0 {
            return Err(Effect::fail("Value must be a zero or a positive number"));
        }
        if state.value.checked_add(value).is_none() {
            return Err(Effect::fail("Increase value is too high. Counter would overflow"));
        }
        Ok(())
    }

    fn emit_increase(value: i64) -> Effect<Counter> {
        Effect::emit(CounterEvent::ValueIncreased(ValueIncreased { value }))
            .then_reply(|_| CounterReply::Done)
    }

    fn increase(state: &CounterState, cmd: Increase, _: &CommandContext) -> Effect<Counter> {
        if let Err(failed) = Self::ensure_increment(state, cmd.value) {
            return failed;
        }
        Self::emit_increase(cmd.value)
    }

    fn increase_with_side_effect(
        state: &CounterState,
        cmd: IncreaseWithSideEffect,
        ctx: &CommandContext,
    ) -> Effect<Counter> {
        if let Err(failed) = Self::ensure_increment(state, cmd.value) {
            return failed;
        }
        let Some(doubled) = cmd.value.checked_mul(2) else {
            return Effect::fail("Increase value is too high. Counter would overflow");
        };

        let follow_up = CounterCommand::Increase(Increase { value: doubled });
        let side_effect = match SideEffect::to::<Counter>(ctx.entity_id().clone(), &follow_up) {
            Ok(se) => se,
            Err(e) => return Effect::fail(format!("cannot encode side effect: {e}")),
        };

        Effect::emit(CounterEvent::ValueIncreased(ValueIncreased { value: cmd.value }))
            .then_send(side_effect)
            .then_reply(|_| CounterReply::Done)
    }

    fn increase_with_conditional(
        state: &CounterState,
        cmd: IncreaseWithConditional,
        ctx: &CommandContext,
    ) -> Effect<Counter> {
        if cmd.value < 0 {
            return Effect::fail("Value must be a zero or a positive number");
        }
        let value = if ctx.metadata().is(DOUBLE_INCREASE_KEY, DOUBLE_INCREASE_VALUE) {
            match cmd.value.checked_mul(2) {
                Some(v) => v,
                None => return Effect::fail("Increase value is too high. Counter would overflow"),
            }
        } else {
            cmd.value
        };
        if let Err(failed) = Self::ensure_increment(state, value) {
            return failed;
        }
        Self::emit_increase(value)
    }

    fn decrease(state: &CounterState, cmd: Decrease, _: &CommandContext) -> Effect<Counter> {
        if cmd.value > 0 {
            return Effect::fail("Value must be a zero or a negative number");
        }
        match state.value.checked_add(cmd.value) {
            Some(v) if v >= 0 => Effect::emit(CounterEvent::ValueDecreased(ValueDecreased {
                value: cmd.value,
            }))
            .then_reply(|_| CounterReply::Done),
            _ => Effect::fail("Decrease value is too high. Counter cannot become negative"),
        }
    }

    fn reset(_: &CounterState, _: Reset, _: &CommandContext) -> Effect<Counter> {
        Effect::emit(CounterEvent::ValueReset(ValueReset {})).then_reply(|_| CounterReply::Done)
    }

    fn get_current_counter(
        state: &CounterState,
        _: GetCurrentCounter,
        _: &CommandContext,
    ) -> Effect<Counter> {
        Effect::reply(CounterReply::Current(CurrentCounter { value: state.value }))
    }

    fn value_increased(state: CounterState, ev: &ValueIncreased) -> CounterState {
        CounterState {
            value: state.value.saturating_add(ev.value),
        }
    }

    fn value_decreased(state: CounterState, ev: &ValueDecreased) -> CounterState {
        CounterState {
            value: state.value.saturating_add(ev.value),
        }
    }

    fn value_reset(_: CounterState, _: &ValueReset) -> CounterState {
        Counter::empty_state()
    }
}

/// Convenience for addressing a counter from outside the entity.
pub fn counter_id(id: impl Into<String>) -> EntityId {
    EntityId::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::{DomainError, Metadata};
    use eventide_events::{Behavior, Execution, execute};

    fn behavior() -> Behavior<Counter> {
        Behavior::new().unwrap()
    }

    fn ctx() -> CommandContext {
        CommandContext::new(counter_id("c-1"), Metadata::new())
    }

    fn run(
        behavior: &Behavior<Counter>,
        state: &CounterState,
        cmd: CounterCommand,
    ) -> Result<Execution<Counter>, DomainError> {
        execute(behavior, state, cmd, &ctx())
    }

    #[test]
    fn increase_emits_value_increased() {
        let b = behavior();
        let out = run(&b, &CounterState::default(), CounterCommand::Increase(Increase { value: 5 }))
            .unwrap();
        assert_eq!(
            out.events,
            vec![CounterEvent::ValueIncreased(ValueIncreased { value: 5 })]
        );
        assert_eq!(out.state.value, 5);
        assert_eq!(out.reply, CounterReply::Done);
    }

    #[test]
    fn increase_rejects_negative_values() {
        let b = behavior();
        let err = run(&b, &CounterState::default(), CounterCommand::Increase(Increase { value: -1 }))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("Value must be a zero or a positive number")
        );
    }

    #[test]
    fn decrease_scenario_keeps_counter_non_negative() {
        let b = behavior();
        let s1 = run(&b, &CounterState::default(), CounterCommand::Increase(Increase { value: 5 }))
            .unwrap()
            .state;
        let s2 = run(&b, &s1, CounterCommand::Decrease(Decrease { value: -3 }))
            .unwrap()
            .state;
        assert_eq!(s2.value, 2);

        let err = run(&b, &s2, CounterCommand::Decrease(Decrease { value: -10 }))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("Decrease value is too high. Counter cannot become negative")
        );
    }

    #[test]
    fn decrease_rejects_positive_values() {
        let b = behavior();
        let err = run(
            &b,
            &CounterState { value: 10 },
            CounterCommand::Decrease(Decrease { value: 1 }),
        )
        .map(|_| ())
        .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn side_effect_targets_same_counter_with_doubled_value() {
        let b = behavior();
        let out = run(
            &b,
            &CounterState::default(),
            CounterCommand::IncreaseWithSideEffect(IncreaseWithSideEffect { value: 3 }),
        )
        .unwrap();
        assert_eq!(out.state.value, 3);
        assert_eq!(out.side_effects.len(), 1);

        let se = &out.side_effects[0];
        assert_eq!(se.entity_type(), "counter");
        assert_eq!(se.entity_id(), &counter_id("c-1"));
        let cmd: CounterCommand = serde_json::from_value(se.command().clone()).unwrap();
        assert_eq!(cmd, CounterCommand::Increase(Increase { value: 6 }));
    }

    #[test]
    fn conditional_increase_doubles_only_with_flag() {
        let b = behavior();
        let cmd = CounterCommand::IncreaseWithConditional(IncreaseWithConditional { value: 4 });

        let plain = run(&b, &CounterState::default(), cmd.clone()).unwrap();
        assert_eq!(plain.state.value, 4);

        let flagged = CommandContext::new(
            counter_id("c-1"),
            Metadata::new().with(DOUBLE_INCREASE_KEY, DOUBLE_INCREASE_VALUE),
        );
        let doubled = execute(&b, &CounterState::default(), cmd.clone(), &flagged).unwrap();
        assert_eq!(doubled.state.value, 8);

        let other = CommandContext::new(
            counter_id("c-1"),
            Metadata::new().with(DOUBLE_INCREASE_KEY, "other"),
        );
        assert_eq!(execute(&b, &CounterState::default(), cmd, &other).unwrap().state.value, 4);
    }

    #[test]
    fn reset_returns_empty_state() {
        let b = behavior();
        let out = run(&b, &CounterState { value: 17 }, CounterCommand::Reset(Reset {})).unwrap();
        assert_eq!(out.state, CounterState::default());
    }

    #[test]
    fn get_current_counter_replies_without_events() {
        let b = behavior();
        let out = run(
            &b,
            &CounterState { value: 9 },
            CounterCommand::GetCurrentCounter(GetCurrentCounter {}),
        )
        .unwrap();
        assert!(out.events.is_empty());
        assert_eq!(out.reply, CounterReply::Current(CurrentCounter { value: 9 }));
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: CounterCommand = serde_json::from_str(r#"{"Increase":{"value":5}}"#).unwrap();
        assert_eq!(cmd, CounterCommand::Increase(Increase { value: 5 }));
        let cmd: CounterCommand = serde_json::from_str(r#"{"Reset":{}}"#).unwrap();
        assert_eq!(cmd, CounterCommand::Reset(Reset {}));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn command() -> impl Strategy<Value = CounterCommand> {
            prop_oneof![
                (-50i64..100).prop_map(|value| CounterCommand::Increase(Increase { value })),
                (-100i64..50).prop_map(|value| CounterCommand::Decrease(Decrease { value })),
                (-50i64..100).prop_map(|value| {
                    CounterCommand::IncreaseWithConditional(IncreaseWithConditional { value })
                }),
                Just(CounterCommand::Reset(Reset {})),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: replaying the emitted events rebuilds the in-memory state.
            #[test]
            fn replay_matches_live_state(commands in prop::collection::vec(command(), 0..40)) {
                let b = behavior();
                let mut state = CounterState::default();
                let mut log = Vec::new();

                for cmd in commands {
                    if let Ok(out) = run(&b, &state, cmd) {
                        log.extend(out.events);
                        state = out.state;
                    }
                }

                prop_assert_eq!(b.replay(&log), state.clone());
                prop_assert_eq!(b.replay(&log), b.replay(&log));
            }

            /// Property: no command sequence drives the counter below zero.
            #[test]
            fn counter_never_negative(commands in prop::collection::vec(command(), 0..40)) {
                let b = behavior();
                let mut state = CounterState::default();
                for cmd in commands {
                    if let Ok(out) = run(&b, &state, cmd) {
                        state = out.state;
                    }
                    prop_assert!(state.value >= 0);
                }
            }

            /// Property: reset always yields the empty state.
            #[test]
            fn reset_is_idempotent(value in 0i64..1_000_000) {
                let b = behavior();
                let once = run(&b, &CounterState { value }, CounterCommand::Reset(Reset {})).unwrap().state;
                let twice = run(&b, &once, CounterCommand::Reset(Reset {})).unwrap().state;
                prop_assert_eq!(&once, &CounterState::default());
                prop_assert_eq!(once, twice);
            }
        }
    }
}
