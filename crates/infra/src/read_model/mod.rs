//! Read model storage and query abstractions.

pub mod query;
pub mod row_store;

pub use query::{QueryError, QueryParams, QueryableView, ViewCatalog};
pub use row_store::{InMemoryRowStore, RowStore};
