//! Read-side consumer contract.
//!
//! A projection builds a read model from committed events (CQRS read side). Read models
//! are **disposable**: events are the source of truth and a projection can be reset and
//! rebuilt by replaying the store.
//!
//! Delivery is at-least-once, so `apply` must be idempotent. Views built on
//! [`SubjectCursors`](crate::SubjectCursors) get this for free: an envelope whose
//! `(subject, sequence_number)` was already applied reports [`Applied::Duplicate`].

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use eventide_core::{EntityId, EventId, Metadata};

use crate::{EventEnvelope, SubscriptionFilter};

/// What applying one envelope did to a projection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    /// At least one row was written.
    Updated,
    /// The envelope was applied before; nothing changed.
    Duplicate,
    /// No handler is interested in this event type.
    Ignored,
}

/// Delivery failure reported by a projection or action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("cannot decode '{event_type}': {message}")]
    Decode { event_type: String, message: String },

    #[error("table '{table}': no row for '{subject}' while applying '{event_type}'")]
    MissingRow {
        table: String,
        subject: String,
        event_type: String,
    },

    #[error("subject '{subject}': non-monotonic sequence (last: {last}, found: {found})")]
    NonMonotonicSequence { subject: String, last: u64, found: u64 },

    #[error("handler failed: {0}")]
    Handler(String),
}

impl DeliveryError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::Decode { .. } => "decode",
            DeliveryError::MissingRow { .. } => "missing_row",
            DeliveryError::NonMonotonicSequence { .. } => "non_monotonic_sequence",
            DeliveryError::Handler(_) => "handler",
        }
    }

    /// Whether redelivering the same envelope can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Handler(_))
    }
}

/// What an update handler knows about the event it is applying.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    table: &'a str,
    envelope: &'a EventEnvelope<JsonValue>,
}

impl<'a> UpdateContext<'a> {
    pub fn new(table: &'a str, envelope: &'a EventEnvelope<JsonValue>) -> Self {
        Self { table, envelope }
    }

    pub fn table(&self) -> &str {
        self.table
    }

    pub fn subject(&self) -> &EntityId {
        self.envelope.subject()
    }

    pub fn entity_type(&self) -> &str {
        self.envelope.entity_type()
    }

    pub fn event_type(&self) -> &str {
        self.envelope.event_type()
    }

    pub fn sequence_number(&self) -> u64 {
        self.envelope.sequence_number()
    }

    pub fn event_id(&self) -> EventId {
        self.envelope.event_id()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.envelope.recorded_at()
    }

    pub fn metadata(&self) -> &Metadata {
        self.envelope.metadata()
    }

    /// Unwrap the prior row, or report [`DeliveryError::MissingRow`].
    pub fn require<R>(&self, prior: Option<R>) -> Result<R, DeliveryError> {
        prior.ok_or_else(|| DeliveryError::MissingRow {
            table: self.table.to_string(),
            subject: self.subject().to_string(),
            event_type: self.event_type().to_string(),
        })
    }
}

/// A read model fed by committed events.
///
/// Projections are shared between the worker that feeds them and the readers that
/// query them, so `apply` takes `&self` and implementations use interior mutability.
pub trait Projection: Send + Sync {
    /// Stable name (used for logging and catalog lookup).
    fn name(&self) -> &str;

    /// The entity streams this projection consumes.
    fn sources(&self) -> Vec<SubscriptionFilter>;

    /// Apply one envelope. Must be idempotent.
    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, DeliveryError>;

    /// Drop every row and cursor so the projection can be rebuilt from scratch.
    fn reset(&self);
}
