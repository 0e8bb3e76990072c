//! Counter domain module (event-sourced).
//!
//! This crate contains business rules for a simple counter, implemented purely as
//! deterministic domain logic (no IO, no storage), plus an action reacting to its events.

pub mod counter;
pub mod threshold;

pub use counter::{
    Counter, CounterCommand, CounterEvent, CounterReply, CounterState, CurrentCounter,
    DOUBLE_INCREASE_KEY, DOUBLE_INCREASE_VALUE, Decrease, GetCurrentCounter, Increase,
    IncreaseWithConditional, IncreaseWithSideEffect, Reset, ValueDecreased, ValueIncreased,
    ValueReset, counter_id,
};
pub use threshold::ThresholdBump;
