//! Event-driven actions (framework only, no business rules).
//!
//! An action observes committed events and reacts by producing [`SideEffect`]s:
//! commands sent to other (or the same) entity instances. Actions hold no state of
//! their own; infra deduplicates redeliveries per subject and dispatches whatever
//! `react` returns through a command sender.

use serde_json::Value as JsonValue;

use crate::{DeliveryError, EventEnvelope, SideEffect, SubscriptionFilter};

pub trait Action: Send + Sync {
    /// Stable action name (for logging).
    fn name(&self) -> &str;

    /// The entity streams this action observes.
    fn subscriptions(&self) -> Vec<SubscriptionFilter>;

    /// React to one committed event. An empty vector means "nothing to do".
    fn react(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Vec<SideEffect>, DeliveryError>;
}
