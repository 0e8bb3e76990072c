//! A view: a named set of tables fed by one subscription.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde_json::Value as JsonValue;

use eventide_core::RegistrationError;
use eventide_events::{Applied, DeliveryError, EventEnvelope, Projection, SubscriptionFilter};

use super::table::Table;

/// Fans every envelope out to each of its tables.
///
/// Tables commit independently: when one table fails, the others keep what they
/// applied, and a redelivery only changes the failed table (the others see a
/// duplicate).
///
/// Every fan-out runs under the view's write lock; readers that hold
/// [`View::read_snapshot`] see the tables between two envelopes, never mid-update.
pub struct View {
    name: String,
    tables: Vec<Arc<dyn Table>>,
    consistency: RwLock<()>,
}

impl View {
    pub fn builder(name: impl Into<String>) -> ViewBuilder {
        ViewBuilder {
            name: name.into(),
            tables: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name()).collect()
    }

    /// Blocks envelope application until the guard is dropped.
    ///
    /// Hold it across every table read that must observe one point in time.
    pub fn read_snapshot(&self) -> RwLockReadGuard<'_, ()> {
        self.consistency
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ViewBuilder {
    name: String,
    tables: Vec<Arc<dyn Table>>,
    errors: Vec<RegistrationError>,
}

impl ViewBuilder {
    pub fn table(mut self, table: Arc<dyn Table>) -> Self {
        if self.tables.iter().any(|t| t.name() == table.name()) {
            self.errors.push(RegistrationError::DuplicateTable {
                view: self.name.clone(),
                table: table.name().to_string(),
            });
            return self;
        }
        self.tables.push(table);
        self
    }

    pub fn build(self) -> Result<View, RegistrationError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        Ok(View {
            name: self.name,
            tables: self.tables,
            consistency: RwLock::new(()),
        })
    }
}

impl Projection for View {
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> Vec<SubscriptionFilter> {
        let entity_types: BTreeSet<String> = self
            .tables
            .iter()
            .flat_map(|t| t.sources())
            .map(|f| f.entity_type().to_string())
            .collect();
        entity_types
            .into_iter()
            .map(SubscriptionFilter::entity)
            .collect()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, DeliveryError> {
        let _write = self
            .consistency
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut outcome = Applied::Ignored;
        let mut first_error = None;

        for table in &self.tables {
            match table.apply(envelope) {
                Ok(Applied::Updated) => outcome = Applied::Updated,
                Ok(Applied::Duplicate) if outcome == Applied::Ignored => {
                    outcome = Applied::Duplicate
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        view = %self.name,
                        table = table.name(),
                        code = err.code(),
                        error = %err,
                        "table update failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }

    fn reset(&self) {
        let _write = self
            .consistency
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for table in &self.tables {
            table.clear();
        }
    }
}

impl core::fmt::Debug for View {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("tables", &self.table_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::table::ViewTable;
    use eventide_core::{EntityId, EventId};
    use eventide_counter::{Counter, ValueIncreased};
    use serde_json::json;

    fn increased(seq: u64, value: i64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EventId::new(),
            "counter",
            EntityId::new("c1"),
            seq,
            "ValueIncreased",
            json!({"ValueIncreased": {"value": value}}),
        )
    }

    fn sum_table(name: &str) -> Arc<ViewTable<i64>> {
        Arc::new(
            ViewTable::<i64>::builder(name)
                .on::<Counter, ValueIncreased, _>(|prior, ev, _| Ok(prior.unwrap_or(0) + ev.value))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn every_table_sees_every_event() {
        let a = sum_table("a");
        let b = sum_table("b");
        let view = View::builder("sums")
            .table(a.clone())
            .table(b.clone())
            .build()
            .unwrap();

        assert_eq!(view.sources(), vec![SubscriptionFilter::entity("counter")]);
        assert_eq!(view.apply(&increased(1, 2)).unwrap(), Applied::Updated);
        assert_eq!(view.apply(&increased(1, 2)).unwrap(), Applied::Duplicate);
        assert_eq!(a.get(&EntityId::new("c1")), Some(2));
        assert_eq!(b.get(&EntityId::new("c1")), Some(2));

        view.reset();
        assert!(a.is_empty() && b.is_empty());
    }

    #[test]
    fn duplicate_table_names_are_rejected() {
        let err = View::builder("sums")
            .table(sum_table("a"))
            .table(sum_table("a"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::DuplicateTable {
                view: "sums".into(),
                table: "a".into()
            }
        );
    }
}
