//! Domain foundation building blocks for the eventide runtime.
//!
//! This crate contains **pure** primitives shared by the write side and the read side
//! (identifiers, errors, metadata, message typing). No IO, no async.

pub mod error;
pub mod id;
pub mod message;
pub mod metadata;
pub mod version;

pub use error::{DomainError, DomainResult, RegistrationError};
pub use id::{CommandId, EntityId, EventId};
pub use message::{Message, Variant};
pub use metadata::Metadata;
pub use version::ExpectedVersion;
