//! `structured-customer-orders`: customers joined with their orders and the ordered
//! products, keyed by customer id.
//!
//! Three tables feed the join:
//! - `customers`: folded from customer events
//! - `products`: folded from product events
//! - `orders`: mirror of order state
//!
//! The query is an inner join: a customer with no order whose product is known yields
//! no result. Order lines are sorted by creation time, then order id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use eventide_core::{EntityId, RegistrationError};
use eventide_customers::{
    Address, Customer, CustomerAddressChanged, CustomerCreated, CustomerNameChanged,
};
use eventide_events::{
    Applied, Behavior, DeliveryError, EventEnvelope, Projection, SubscriptionFilter,
};
use eventide_orders::{Order, OrderState};
use eventide_products::{
    Money, Product, ProductCreated, ProductNameChanged, ProductPriceChanged,
};

use super::table::ViewTable;
use super::view::View;
use crate::read_model::{QueryError, QueryParams, QueryableView};

pub const VIEW_NAME: &str = "structured-customer-orders";
pub const CUSTOMER_ID_PARAM: &str = "customer_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRow {
    pub customer_id: String,
    pub email: String,
    pub name: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: String,
    pub product_name: String,
    pub price: Money,
}

/// Query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrders {
    pub id: String,
    pub shipping: CustomerShipping,
    pub orders: Vec<ProductOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerShipping {
    pub name: String,
    pub address1: String,
    pub address2: String,
    pub contact_email: String,
}

/// One order line: the ordered product joined with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductOrder {
    /// Product id.
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub value: Money,
    pub order_id: String,
    pub order_created_timestamp: DateTime<Utc>,
}

pub struct StructuredCustomerOrdersView {
    view: View,
    customers: Arc<ViewTable<CustomerRow>>,
    products: Arc<ViewTable<ProductRow>>,
    orders: Arc<ViewTable<OrderState>>,
}

impl StructuredCustomerOrdersView {
    pub fn new() -> Result<Self, RegistrationError> {
        let customers = Arc::new(customers_table()?);
        let products = Arc::new(products_table()?);
        let orders = Arc::new(
            ViewTable::builder("orders")
                .mirror(Arc::new(Behavior::<Order>::new()?))
                .build()?,
        );

        let view = View::builder(VIEW_NAME)
            .table(customers.clone())
            .table(products.clone())
            .table(orders.clone())
            .build()?;

        Ok(Self {
            view,
            customers,
            products,
            orders,
        })
    }

    pub fn customers(&self) -> &ViewTable<CustomerRow> {
        &self.customers
    }

    pub fn products(&self) -> &ViewTable<ProductRow> {
        &self.products
    }

    pub fn orders(&self) -> &ViewTable<OrderState> {
        &self.orders
    }

    /// Join the customer's row with its orders and their products.
    ///
    /// All three tables are read under one snapshot guard.
    pub fn get(&self, customer_id: &str) -> Option<CustomerOrders> {
        let _snapshot = self.view.read_snapshot();
        let customer = self.customers.get(&EntityId::new(customer_id))?;

        let mut lines: Vec<ProductOrder> = self
            .orders
            .rows()
            .into_iter()
            .map(|(_, order)| order)
            .filter(|order| order.created && order.customer_id == customer_id)
            .filter_map(|order| {
                let product = self.products.get(&EntityId::new(order.product_id.as_str()))?;
                Some(ProductOrder {
                    id: product.product_id,
                    name: product.product_name,
                    quantity: order.quantity,
                    value: product.price,
                    order_id: order.order_id,
                    order_created_timestamp: order.created_at,
                })
            })
            .collect();

        if lines.is_empty() {
            return None;
        }
        lines.sort_by(|a, b| {
            a.order_created_timestamp
                .cmp(&b.order_created_timestamp)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });

        Some(CustomerOrders {
            id: customer.customer_id,
            shipping: CustomerShipping {
                name: customer.name,
                address1: customer.address.street,
                address2: customer.address.city,
                contact_email: customer.email,
            },
            orders: lines,
        })
    }
}

fn customers_table() -> Result<ViewTable<CustomerRow>, RegistrationError> {
    ViewTable::<CustomerRow>::builder("customers")
        .on::<Customer, CustomerCreated, _>(|_prior, created, ctx| {
            Ok(CustomerRow {
                customer_id: ctx.subject().to_string(),
                email: created.email.clone(),
                name: created.name.clone(),
                address: created.address.clone(),
            })
        })
        .on::<Customer, CustomerNameChanged, _>(|prior, changed, ctx| {
            Ok(CustomerRow {
                name: changed.new_name.clone(),
                ..ctx.require(prior)?
            })
        })
        .on::<Customer, CustomerAddressChanged, _>(|prior, changed, ctx| {
            Ok(CustomerRow {
                address: changed.new_address.clone(),
                ..ctx.require(prior)?
            })
        })
        .build()
}

fn products_table() -> Result<ViewTable<ProductRow>, RegistrationError> {
    ViewTable::<ProductRow>::builder("products")
        .on::<Product, ProductCreated, _>(|_prior, created, ctx| {
            Ok(ProductRow {
                product_id: ctx.subject().to_string(),
                product_name: created.name.clone(),
                price: created.price.clone(),
            })
        })
        .on::<Product, ProductNameChanged, _>(|prior, changed, ctx| {
            Ok(ProductRow {
                product_name: changed.new_name.clone(),
                ..ctx.require(prior)?
            })
        })
        .on::<Product, ProductPriceChanged, _>(|prior, changed, ctx| {
            Ok(ProductRow {
                price: changed.new_price.clone(),
                ..ctx.require(prior)?
            })
        })
        .build()
}

impl Projection for StructuredCustomerOrdersView {
    fn name(&self) -> &str {
        VIEW_NAME
    }

    fn sources(&self) -> Vec<SubscriptionFilter> {
        self.view.sources()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, DeliveryError> {
        self.view.apply(envelope)
    }

    fn reset(&self) {
        self.view.reset()
    }
}

impl QueryableView for StructuredCustomerOrdersView {
    fn name(&self) -> &str {
        VIEW_NAME
    }

    fn query(&self, params: &QueryParams) -> Result<Option<JsonValue>, QueryError> {
        let customer_id = params.require(CUSTOMER_ID_PARAM)?;
        self.get(customer_id)
            .map(|result| serde_json::to_value(result).map_err(|e| QueryError::Encode(e.to_string())))
            .transpose()
    }
}

impl core::fmt::Debug for StructuredCustomerOrdersView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StructuredCustomerOrdersView")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eventide_core::EventId;
    use eventide_customers::CustomerEvent;
    use eventide_orders::{OrderCreated, OrderEvent};
    use eventide_products::ProductEvent;
    use serde::Serialize;
    use crate::projections::table::Table;

    fn env<E: Serialize>(
        entity_type: &str,
        subject: &str,
        seq: u64,
        event_type: &str,
        event: &E,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EventId::new(),
            entity_type,
            EntityId::new(subject),
            seq,
            event_type,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn usd(units: i64, cents: i32) -> Money {
        Money::new("USD", units, cents)
    }

    fn seed_customer(view: &StructuredCustomerOrdersView) {
        let created = CustomerEvent::CustomerCreated(CustomerCreated {
            email: "ann@example.com".into(),
            name: "Ann".into(),
            address: Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
            },
        });
        view.apply(&env("customer", "C1", 1, "CustomerCreated", &created))
            .unwrap();
    }

    fn seed_product(view: &StructuredCustomerOrdersView, id: &str, name: &str, price: Money) {
        let created = ProductEvent::ProductCreated(ProductCreated {
            name: name.into(),
            price,
        });
        view.apply(&env("product", id, 1, "ProductCreated", &created))
            .unwrap();
    }

    fn seed_order(
        view: &StructuredCustomerOrdersView,
        order_id: &str,
        product_id: &str,
        quantity: u32,
        minute: u32,
    ) {
        let created = OrderEvent::OrderCreated(OrderCreated {
            order_id: order_id.into(),
            customer_id: "C1".into(),
            product_id: product_id.into(),
            quantity,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
        });
        view.apply(&env("order", order_id, 1, "OrderCreated", &created))
            .unwrap();
    }

    #[test]
    fn joins_customer_orders_and_products() {
        let view = StructuredCustomerOrdersView::new().unwrap();
        seed_customer(&view);
        seed_product(&view, "P1", "Widget", usd(9, 99));
        seed_order(&view, "O1", "P1", 2, 0);

        let result = view.get("C1").unwrap();
        assert_eq!(result.id, "C1");
        assert_eq!(result.shipping.name, "Ann");
        assert_eq!(result.shipping.address1, "1 Main St");
        assert_eq!(result.shipping.address2, "Springfield");
        assert_eq!(result.shipping.contact_email, "ann@example.com");
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].name, "Widget");
        assert_eq!(result.orders[0].quantity, 2);
        assert_eq!(result.orders[0].value, usd(9, 99));
    }

    #[test]
    fn orders_are_sorted_by_creation_time() {
        let view = StructuredCustomerOrdersView::new().unwrap();
        seed_customer(&view);
        seed_product(&view, "P1", "Widget", usd(9, 99));
        seed_product(&view, "P2", "Gadget", usd(5, 0));
        seed_order(&view, "O-late", "P1", 1, 30);
        seed_order(&view, "O-early", "P2", 3, 5);

        let result = view.get("C1").unwrap();
        let ids: Vec<_> = result.orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["O-early", "O-late"]);
    }

    #[test]
    fn updates_flow_into_the_join() {
        let view = StructuredCustomerOrdersView::new().unwrap();
        seed_customer(&view);
        seed_product(&view, "P1", "Widget", usd(9, 99));
        seed_order(&view, "O1", "P1", 2, 0);

        let renamed = CustomerEvent::CustomerNameChanged(CustomerNameChanged {
            new_name: "Ann Smith".into(),
        });
        view.apply(&env("customer", "C1", 2, "CustomerNameChanged", &renamed))
            .unwrap();
        let repriced = ProductEvent::ProductPriceChanged(ProductPriceChanged {
            new_price: usd(12, 50),
        });
        view.apply(&env("product", "P1", 2, "ProductPriceChanged", &repriced))
            .unwrap();

        let result = view.get("C1").unwrap();
        assert_eq!(result.shipping.name, "Ann Smith");
        assert_eq!(result.orders[0].value, usd(12, 50));
    }

    #[test]
    fn change_before_create_is_a_missing_row() {
        let view = StructuredCustomerOrdersView::new().unwrap();
        let renamed = CustomerEvent::CustomerNameChanged(CustomerNameChanged {
            new_name: "Ghost".into(),
        });
        let err = view
            .apply(&env("customer", "C9", 1, "CustomerNameChanged", &renamed))
            .unwrap_err();
        assert_eq!(err.code(), "missing_row");
        assert!(view.customers().is_empty());
    }

    #[test]
    fn query_uses_camel_case_json_and_inner_join() {
        let view = StructuredCustomerOrdersView::new().unwrap();
        seed_customer(&view);

        let params = QueryParams::new().with(CUSTOMER_ID_PARAM, "C1");
        assert_eq!(view.query(&params).unwrap(), None);

        seed_product(&view, "P1", "Widget", usd(9, 99));
        seed_order(&view, "O1", "P1", 2, 0);
        let json = view.query(&params).unwrap().unwrap();
        assert_eq!(json["shipping"]["contactEmail"], "ann@example.com");
        assert_eq!(json["orders"][0]["orderId"], "O1");
        assert_eq!(json["orders"][0]["value"]["units"], 9);

        assert_eq!(view.query(&QueryParams::new()).unwrap_err().code(), "missing_param");
    }

    #[test]
    fn reads_never_mix_states_from_concurrent_updates() {
        let view = Arc::new(StructuredCustomerOrdersView::new().unwrap());
        let created = CustomerEvent::CustomerCreated(CustomerCreated {
            email: "ann@example.com".into(),
            name: "1".into(),
            address: Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
            },
        });
        view.apply(&env("customer", "C1", 1, "CustomerCreated", &created))
            .unwrap();
        seed_product(&view, "P1", "Widget", usd(1, 0));
        seed_order(&view, "O1", "P1", 1, 0);

        const ROUNDS: u64 = 500;
        let writer = {
            let view = Arc::clone(&view);
            std::thread::spawn(move || {
                for seq in 2..=ROUNDS {
                    let renamed = CustomerEvent::CustomerNameChanged(CustomerNameChanged {
                        new_name: seq.to_string(),
                    });
                    view.apply(&env("customer", "C1", seq, "CustomerNameChanged", &renamed))
                        .unwrap();
                    let repriced = ProductEvent::ProductPriceChanged(ProductPriceChanged {
                        new_price: usd(seq as i64, 0),
                    });
                    view.apply(&env("product", "P1", seq, "ProductPriceChanged", &repriced))
                        .unwrap();
                }
            })
        };

        // Renames land before reprices, so a consistent read has price == name
        // or price == name - 1.
        loop {
            let finished = writer.is_finished();
            let result = view.get("C1").unwrap();
            let name: i64 = result.shipping.name.parse().unwrap();
            let price = result.orders[0].value.units;
            assert!(
                price == name || price == name - 1,
                "inconsistent read: name {name}, price {price}"
            );
            if finished {
                break;
            }
        }
        writer.join().unwrap();

        let last = view.get("C1").unwrap();
        assert_eq!(last.shipping.name, ROUNDS.to_string());
        assert_eq!(last.orders[0].value, usd(ROUNDS as i64, 0));
    }
}
