//! Products domain module (event-sourced).
//!
//! This crate contains business rules for the product catalog, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod product;

pub use product::{
    ChangeProductName, ChangeProductPrice, CreateProduct, GetProduct, Money, Product,
    ProductCommand, ProductCreated, ProductEvent, ProductNameChanged, ProductPriceChanged,
    ProductReply, ProductState,
};
