//! Keyed view tables fed by update handlers.
//!
//! A table holds one row per subject. Every `(entity_type, event_type)` it consumes has
//! exactly one update handler `(prior row, event) -> new row`. Each table tracks its own
//! per-subject cursors, so a redelivered event is skipped and a gap is rejected.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use eventide_core::{EntityId, Message, RegistrationError, Variant};
use eventide_events::{
    Applied, Behavior, CursorCheck, DeliveryError, EventEnvelope, EventSourcedEntity,
    SubjectCursors, SubscriptionFilter, UpdateContext, decode_event,
};

use crate::read_model::{InMemoryRowStore, RowStore};

type UpdateFn<R> = Box<
    dyn Fn(Option<R>, &EventEnvelope<JsonValue>, &UpdateContext<'_>) -> Result<R, DeliveryError>
        + Send
        + Sync,
>;

/// Object-safe face of a [`ViewTable`], used by views to fan events out.
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    /// One filter per entity type the table consumes.
    fn sources(&self) -> Vec<SubscriptionFilter>;

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, DeliveryError>;

    /// Drop every row and cursor.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for a [`ViewTable`].
pub struct TableBuilder<R> {
    name: String,
    handlers: HashMap<(String, String), UpdateFn<R>>,
    store: Option<Arc<dyn RowStore<EntityId, R>>>,
    errors: Vec<RegistrationError>,
}

impl<R> TableBuilder<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            store: None,
            errors: Vec::new(),
        }
    }

    /// Update rows from events `V` of entity `A`.
    ///
    /// The handler receives the prior row (`None` if the subject has no row yet).
    pub fn on<A, V, F>(mut self, handler: F) -> Self
    where
        A: EventSourcedEntity,
        V: Variant<A::Event>,
        F: Fn(Option<R>, &V, &UpdateContext<'_>) -> Result<R, DeliveryError>
            + Send
            + Sync
            + 'static,
    {
        let update: UpdateFn<R> = Box::new(
            move |prior: Option<R>,
                  envelope: &EventEnvelope<JsonValue>,
                  ctx: &UpdateContext<'_>| {
                let event = decode_event::<A>(envelope)?;
                let Some(variant) = V::take(event) else {
                    return Err(DeliveryError::Decode {
                        event_type: envelope.event_type().to_string(),
                        message: format!("payload is not a '{}'", V::TYPE),
                    });
                };
                handler(prior, &variant, ctx)
            },
        );
        self.insert(A::ENTITY_TYPE, V::TYPE, update);
        self
    }

    /// Keep a copy of `A`'s state per subject by folding its events through the
    /// entity's own event handlers.
    ///
    /// The row equals the entity's state only if the table receives the subject's
    /// whole stream starting at sequence 1. `SubscriptionRouter::attach_projection`
    /// does this by reading the backlog from the start before going live.
    pub fn mirror<A>(mut self, behavior: Arc<Behavior<A>>) -> Self
    where
        A: EventSourcedEntity<State = R>,
    {
        for event_type in <A::Event as Message>::declared_types() {
            let behavior = Arc::clone(&behavior);
            let update: UpdateFn<R> = Box::new(
                move |prior: Option<R>,
                      envelope: &EventEnvelope<JsonValue>,
                      _ctx: &UpdateContext<'_>| {
                    let event = decode_event::<A>(envelope)?;
                    Ok(behavior.apply(prior.unwrap_or_else(A::empty_state), &event))
                },
            );
            self.insert(A::ENTITY_TYPE, event_type, update);
        }
        self
    }

    /// Use `store` for rows instead of an in-memory map.
    pub fn with_store(mut self, store: Arc<dyn RowStore<EntityId, R>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ViewTable<R>, RegistrationError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        if self.handlers.is_empty() {
            return Err(RegistrationError::EmptyTable(self.name));
        }

        let entity_types = self.handlers.keys().map(|(t, _)| t.clone()).collect();
        let rows: Arc<dyn RowStore<EntityId, R>> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryRowStore::new()),
        };
        Ok(ViewTable {
            name: self.name,
            handlers: self.handlers,
            entity_types,
            rows,
            cursors: SubjectCursors::new(),
        })
    }

    fn insert(&mut self, entity_type: &str, event_type: &str, update: UpdateFn<R>) {
        let key = (entity_type.to_string(), event_type.to_string());
        if self.handlers.contains_key(&key) {
            self.errors.push(RegistrationError::DuplicateUpdateHandler {
                table: self.name.clone(),
                entity_type: key.0,
                event_type: key.1,
            });
            return;
        }
        self.handlers.insert(key, update);
    }
}

/// One table of a view: rows keyed by subject, plus per-subject cursors.
pub struct ViewTable<R> {
    name: String,
    handlers: HashMap<(String, String), UpdateFn<R>>,
    entity_types: BTreeSet<String>,
    rows: Arc<dyn RowStore<EntityId, R>>,
    cursors: SubjectCursors,
}

impl<R> ViewTable<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn builder(name: impl Into<String>) -> TableBuilder<R> {
        TableBuilder::new(name)
    }

    pub fn get(&self, subject: &EntityId) -> Option<R> {
        self.rows.get(subject)
    }

    /// Point-in-time snapshot of every row.
    pub fn rows(&self) -> Vec<(EntityId, R)> {
        self.rows.list()
    }
}

impl<R> Table for ViewTable<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> Vec<SubscriptionFilter> {
        self.entity_types
            .iter()
            .map(|t| SubscriptionFilter::entity(t.clone()))
            .collect()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, DeliveryError> {
        if !self.entity_types.contains(envelope.entity_type()) {
            return Ok(Applied::Ignored);
        }
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(Applied::Duplicate);
        }

        let key = (
            envelope.entity_type().to_string(),
            envelope.event_type().to_string(),
        );
        let Some(update) = self.handlers.get(&key) else {
            // Unhandled event of a consumed entity: the cursor still moves past it.
            self.cursors.advance(envelope)?;
            return Ok(Applied::Ignored);
        };

        let ctx = UpdateContext::new(&self.name, envelope);
        let prior = self.rows.get(envelope.subject());
        let row = update(prior, envelope, &ctx)?;
        self.rows.upsert(envelope.subject().clone(), row);
        self.cursors.advance(envelope)?;
        Ok(Applied::Updated)
    }

    fn clear(&self) {
        self.rows.clear();
        self.cursors.clear();
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

impl<R> core::fmt::Debug for ViewTable<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewTable")
            .field("name", &self.name)
            .field("entity_types", &self.entity_types)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::EventId;
    use eventide_counter::{Counter, CounterState, ValueIncreased};
    use serde_json::json;

    fn env(subject: &str, seq: u64, event_type: &str, payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EventId::new(),
            "counter",
            EntityId::new(subject),
            seq,
            event_type,
            payload,
        )
    }

    fn increased(subject: &str, seq: u64, value: i64) -> EventEnvelope<JsonValue> {
        env(subject, seq, "ValueIncreased", json!({"ValueIncreased": {"value": value}}))
    }

    fn totals() -> ViewTable<i64> {
        ViewTable::<i64>::builder("totals")
            .on::<Counter, ValueIncreased, _>(|prior, ev, _ctx| Ok(prior.unwrap_or(0) + ev.value))
            .build()
            .unwrap()
    }

    #[test]
    fn applies_updates_and_skips_redelivery() {
        let table = totals();
        assert_eq!(table.apply(&increased("c1", 1, 2)).unwrap(), Applied::Updated);
        assert_eq!(table.apply(&increased("c1", 2, 3)).unwrap(), Applied::Updated);
        assert_eq!(table.apply(&increased("c1", 2, 3)).unwrap(), Applied::Duplicate);
        assert_eq!(table.get(&EntityId::new("c1")), Some(5));
    }

    #[test]
    fn unhandled_events_move_the_cursor() {
        let table = totals();
        table.apply(&increased("c1", 1, 2)).unwrap();
        assert_eq!(
            table
                .apply(&env("c1", 2, "ValueReset", json!({"ValueReset": {}})))
                .unwrap(),
            Applied::Ignored
        );
        assert_eq!(table.apply(&increased("c1", 3, 1)).unwrap(), Applied::Updated);
        assert_eq!(table.get(&EntityId::new("c1")), Some(3));
    }

    #[test]
    fn gaps_are_rejected() {
        let table = totals();
        table.apply(&increased("c1", 1, 2)).unwrap();
        let err = table.apply(&increased("c1", 3, 2)).unwrap_err();
        assert_eq!(err.code(), "non_monotonic_sequence");
    }

    #[test]
    fn other_entity_types_are_ignored() {
        let table = totals();
        let foreign = EventEnvelope::new(
            EventId::new(),
            "product",
            EntityId::new("P1"),
            1,
            "ProductCreated",
            json!({}),
        );
        assert_eq!(table.apply(&foreign).unwrap(), Applied::Ignored);
        assert!(table.is_empty());
    }

    #[test]
    fn mirror_follows_entity_state() {
        let table: ViewTable<CounterState> = ViewTable::builder("counters")
            .mirror(Arc::new(Behavior::<Counter>::new().unwrap()))
            .build()
            .unwrap();
        table.apply(&increased("c1", 1, 4)).unwrap();
        table
            .apply(&env("c1", 2, "ValueDecreased", json!({"ValueDecreased": {"value": -1}})))
            .unwrap();
        assert_eq!(table.get(&EntityId::new("c1")).unwrap().value, 3);
    }

    #[test]
    fn registration_errors() {
        let dup = ViewTable::<i64>::builder("dup")
            .on::<Counter, ValueIncreased, _>(|_, ev, _| Ok(ev.value))
            .on::<Counter, ValueIncreased, _>(|_, ev, _| Ok(ev.value))
            .build()
            .unwrap_err();
        assert!(matches!(dup, RegistrationError::DuplicateUpdateHandler { .. }));

        let empty = ViewTable::<i64>::builder("empty").build().unwrap_err();
        assert_eq!(empty, RegistrationError::EmptyTable("empty".into()));
    }
}
