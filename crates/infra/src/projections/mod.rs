//! View projections (read model builders).
//!
//! Views consume committed events and build query-optimized tables.
//! All views are:
//! - **Rebuildable**: can be reconstructed from the event store
//! - **Idempotent**: safe for at-least-once delivery
//! - **Eventually consistent**: no freshness guarantee against a command that just committed

pub mod customer_orders;
pub mod table;
pub mod view;

pub use customer_orders::{
    CustomerOrders, CustomerRow, CustomerShipping, ProductOrder, ProductRow,
    StructuredCustomerOrdersView,
};
pub use table::{Table, TableBuilder, ViewTable};
pub use view::{View, ViewBuilder};
