//! Wires the whole runtime in memory and walks through the sample domains.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::{Value as JsonValue, json};

use eventide_core::Metadata;
use eventide_counter::{Counter, DOUBLE_INCREASE_KEY, DOUBLE_INCREASE_VALUE, ThresholdBump};
use eventide_customers::Customer;
use eventide_events::{EventEnvelope, InMemoryEventBus};
use eventide_infra::projections::StructuredCustomerOrdersView;
use eventide_infra::read_model::{QueryParams, ViewCatalog};
use eventide_infra::{EntityRegistry, InMemoryEventStore, RuntimeConfig, SubscriptionRouter};
use eventide_orders::Order;
use eventide_products::Product;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eventide_observability::init();

    let config = RuntimeConfig::from_env().context("invalid runtime configuration")?;
    let store = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());

    let registry = EntityRegistry::new(Arc::clone(&store), Arc::clone(&bus), config);
    registry.register::<Counter>()?;
    registry.register::<Customer>()?;
    registry.register::<Product>()?;
    registry.register::<Order>()?;

    let router = SubscriptionRouter::new(Arc::clone(&store), Arc::clone(&bus), config);
    let view = Arc::new(StructuredCustomerOrdersView::new()?);
    router.attach_projection(view.clone()).await?;
    router.attach_action(Arc::new(ThresholdBump::default()), Arc::new(registry.sender()))?;

    let catalog = ViewCatalog::new();
    catalog.register(view)?;

    counter_walkthrough(&registry).await?;
    store_front_walkthrough(&registry).await?;

    // Views and side effects are eventually consistent.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let counter = registry
        .submit("counter", "counter-1", json!({"GetCurrentCounter": {}}), Metadata::new())
        .await?;
    tracing::info!(%counter, "counter after side effects");

    let orders = catalog
        .query(
            "structured-customer-orders",
            &QueryParams::new().with("customer_id", "C1"),
        )?
        .context("customer C1 has no orders in the view yet")?;
    println!("{}", serde_json::to_string_pretty(&orders)?);

    router.shutdown();
    registry.shutdown();
    Ok(())
}

async fn counter_walkthrough(
    registry: &EntityRegistry<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>,
) -> anyhow::Result<()> {
    let id = "counter-1";
    registry
        .submit("counter", id, json!({"Increase": {"value": 5}}), Metadata::new())
        .await?;
    registry
        .submit("counter", id, json!({"Decrease": {"value": -3}}), Metadata::new())
        .await?;

    match registry
        .submit("counter", id, json!({"Decrease": {"value": -10}}), Metadata::new())
        .await
    {
        Ok(reply) => tracing::warn!(%reply, "oversized decrease was accepted"),
        Err(err) => tracing::info!(code = err.code(), error = %err, "oversized decrease rejected"),
    }

    let doubled = Metadata::new().with(DOUBLE_INCREASE_KEY, DOUBLE_INCREASE_VALUE);
    registry
        .submit("counter", id, json!({"IncreaseWithConditional": {"value": 20}}), doubled)
        .await?;
    registry
        .submit("counter", id, json!({"IncreaseWithSideEffect": {"value": 1}}), Metadata::new())
        .await?;
    Ok(())
}

async fn store_front_walkthrough(
    registry: &EntityRegistry<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>,
) -> anyhow::Result<()> {
    let commands = [
        (
            "customer",
            "C1",
            json!({"CreateCustomer": {
                "email": "ann@example.com",
                "name": "Ann",
                "address": {"street": "1 Main St", "city": "Springfield"}
            }}),
        ),
        (
            "product",
            "P1",
            json!({"CreateProduct": {
                "name": "Widget",
                "price": {"currency": "USD", "units": 9, "cents": 99}
            }}),
        ),
        (
            "order",
            "O1",
            json!({"CreateOrder": {
                "customer_id": "C1",
                "product_id": "P1",
                "quantity": 2,
                "created_at": "2024-01-01T12:00:00Z"
            }}),
        ),
        (
            "customer",
            "C1",
            json!({"ChangeCustomerName": {"new_name": "Ann Smith"}}),
        ),
    ];

    for (entity_type, id, command) in commands {
        let reply = registry
            .submit(entity_type, id, command, Metadata::new())
            .await
            .with_context(|| format!("{entity_type}/{id} rejected a command"))?;
        tracing::debug!(entity_type, id, %reply, "command handled");
    }
    Ok(())
}
