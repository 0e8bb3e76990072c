//! Action: bump a counter once it observes a specific increment.

use serde_json::Value as JsonValue;

use eventide_core::Variant;
use eventide_events::{
    Action, DeliveryError, EventEnvelope, SideEffect, SubscriptionFilter, decode_event,
};

use crate::counter::{Counter, CounterCommand, CounterEvent, Increase, ValueIncreased};

/// Sends `Increase(bump)` to a counter whenever it records `ValueIncreased(trigger)`.
///
/// The follow-up increase goes to the subject of the observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdBump {
    pub trigger: i64,
    pub bump: i64,
}

impl Default for ThresholdBump {
    fn default() -> Self {
        Self {
            trigger: 42,
            bump: 1,
        }
    }
}

impl Action for ThresholdBump {
    fn name(&self) -> &str {
        "counter-threshold-bump"
    }

    fn subscriptions(&self) -> Vec<SubscriptionFilter> {
        let increased = <ValueIncreased as Variant<CounterEvent>>::TYPE;
        vec![SubscriptionFilter::of::<Counter>().with_event_type(increased)]
    }

    fn react(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Vec<SideEffect>, DeliveryError> {
        let event = decode_event::<Counter>(envelope)?;
        let Some(increased) = <ValueIncreased as Variant<CounterEvent>>::peek(&event) else {
            return Ok(Vec::new());
        };
        if increased.value != self.trigger {
            return Ok(Vec::new());
        }

        tracing::debug!(
            subject = %envelope.subject(),
            trigger = self.trigger,
            "threshold reached, bumping counter"
        );
        let bump = CounterCommand::Increase(Increase { value: self.bump });
        let side_effect = SideEffect::to::<Counter>(envelope.subject().clone(), &bump)
            .map_err(|e| DeliveryError::handler(format!("cannot encode bump: {e}")))?;
        Ok(vec![side_effect])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::counter_id;
    use eventide_core::{EventId, Message};

    fn envelope(event: CounterEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EventId::new(),
            "counter",
            counter_id("c-42"),
            1,
            event.message_type(),
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn bumps_on_trigger_value() {
        let action = ThresholdBump::default();
        let out = action
            .react(&envelope(CounterEvent::ValueIncreased(ValueIncreased { value: 42 })))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_id(), &counter_id("c-42"));
        let cmd: CounterCommand = serde_json::from_value(out[0].command().clone()).unwrap();
        assert_eq!(cmd, CounterCommand::Increase(Increase { value: 1 }));
    }

    #[test]
    fn ignores_other_values() {
        let action = ThresholdBump::default();
        let out = action
            .react(&envelope(CounterEvent::ValueIncreased(ValueIncreased { value: 41 })))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn subscribes_to_increases_only() {
        let filters = ThresholdBump::default().subscriptions();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].entity_type(), "counter");
        assert_eq!(filters[0].event_types(), ["ValueIncreased".to_string()]);
    }
}
