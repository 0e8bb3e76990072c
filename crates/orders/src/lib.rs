//! Orders domain module (event-sourced).
//!
//! An order links one customer to one product with a quantity and a creation time.
//! Orders are immutable once created; read sides typically mirror their state.

pub mod order;

pub use order::{CreateOrder, GetOrder, Order, OrderCommand, OrderCreated, OrderEvent, OrderState};
