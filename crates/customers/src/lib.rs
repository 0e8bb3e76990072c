//! Customers domain module (event-sourced).
//!
//! This crate contains business rules for customers, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod customer;

pub use customer::{
    Address, ChangeCustomerAddress, ChangeCustomerName, CreateCustomer, Customer,
    CustomerAddressChanged, CustomerCommand, CustomerCreated, CustomerEvent, CustomerNameChanged,
    CustomerReply, CustomerState, GetCustomer,
};
