use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventide_core::{DomainError, EntityId, impl_message};
use eventide_events::{BehaviorBuilder, CommandContext, Effect, Event, EventSourcedEntity};

/// Order state (rebuilt from events).
///
/// `order_id` is the subject of the order's stream, copied into the state so that a
/// mirrored row is self-describing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub created: bool,
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub customer_id: EntityId,
    pub product_id: EntityId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOrder {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    GetOrder(GetOrder),
}

impl_message!(OrderCommand {
    CreateOrder(CreateOrder) => "CreateOrder",
    GetOrder(GetOrder) => "GetOrder",
});

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
}

impl_message!(OrderEvent {
    OrderCreated(OrderCreated) => "OrderCreated",
});

impl Event for OrderEvent {}

/// Entity: Order.
#[derive(Debug, Clone, Copy)]
pub struct Order;

impl EventSourcedEntity for Order {
    const ENTITY_TYPE: &'static str = "order";

    type State = OrderState;
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Reply = OrderState;

    fn empty_state() -> OrderState {
        OrderState::default()
    }

    fn register(b: &mut BehaviorBuilder<Self>) {
        b.on_command(Self::create)
            .on_command(Self::get)
            .on_event(|_: OrderState, e: &OrderCreated| OrderState {
                order_id: e.order_id.clone(),
                customer_id: e.customer_id.clone(),
                product_id: e.product_id.clone(),
                quantity: e.quantity,
                created_at: e.created_at,
                created: true,
            });
    }
}

impl Order {
    fn create(state: &OrderState, cmd: CreateOrder, ctx: &CommandContext) -> Effect<Order> {
        if state.created {
            return Effect::error(DomainError::conflict("order already exists"));
        }
        if cmd.quantity == 0 {
            return Effect::fail("quantity must be positive");
        }
        if cmd.customer_id.as_str().trim().is_empty() || cmd.product_id.as_str().trim().is_empty() {
            return Effect::error(DomainError::invalid_id(
                "order must reference a customer and a product",
            ));
        }
        Effect::emit(OrderEvent::OrderCreated(OrderCreated {
            order_id: ctx.entity_id().to_string(),
            customer_id: cmd.customer_id.into_string(),
            product_id: cmd.product_id.into_string(),
            quantity: cmd.quantity,
            created_at: cmd.created_at,
        }))
        .then_reply(|order: &OrderState| order.clone())
    }

    fn get(state: &OrderState, _: GetOrder, _: &CommandContext) -> Effect<Order> {
        if !state.created {
            return Effect::error(DomainError::not_found("order does not exist"));
        }
        Effect::reply(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eventide_core::Metadata;
    use eventide_events::{Behavior, execute};

    fn ctx() -> CommandContext {
        CommandContext::new(EntityId::new("O1"), Metadata::new())
    }

    fn create(quantity: u32) -> OrderCommand {
        OrderCommand::CreateOrder(CreateOrder {
            customer_id: EntityId::new("C1"),
            product_id: EntityId::new("P1"),
            quantity,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        })
    }

    #[test]
    fn create_records_subject_as_order_id() {
        let b = Behavior::<Order>::new().unwrap();
        let out = execute(&b, &OrderState::default(), create(2), &ctx()).unwrap();
        assert_eq!(out.reply.order_id, "O1");
        assert_eq!(out.reply.customer_id, "C1");
        assert_eq!(out.reply.quantity, 2);
        assert_eq!(out.state, out.reply);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let b = Behavior::<Order>::new().unwrap();
        let err = execute(&b, &OrderState::default(), create(0), &ctx())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn orders_are_created_once() {
        let b = Behavior::<Order>::new().unwrap();
        let out = execute(&b, &OrderState::default(), create(1), &ctx()).unwrap();
        let err = execute(&b, &out.state, create(1), &ctx())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: replay of an accepted order rebuilds the same state.
            #[test]
            fn replay_matches_live_state(quantity in 0u32..1000) {
                let b = Behavior::<Order>::new().unwrap();
                match execute(&b, &OrderState::default(), create(quantity), &ctx()) {
                    Ok(out) => prop_assert_eq!(b.replay(&out.events), out.state),
                    Err(e) => prop_assert_eq!(quantity, 0, "unexpected failure: {}", e),
                }
            }
        }
    }
}
