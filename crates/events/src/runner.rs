//! Delivery bookkeeping shared by projections and actions.
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides per-subject cursor tracking and deterministic replay
//! without making storage assumptions.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use eventide_core::EntityId;

use crate::{Applied, DeliveryError, EventEnvelope, Projection, Sourced};

/// Outcome of checking a delivery against its subject's cursor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    /// Next in sequence (or first seen for the subject): apply it.
    Fresh,
    /// Already applied: skip it.
    Duplicate,
}

/// Last applied sequence number per `(entity_type, subject)`.
///
/// - `seq <= last` is a duplicate and is skipped.
/// - `seq != last + 1` with `last > 0` is a gap and is rejected.
/// - The first delivery for a subject is accepted at any sequence number, so a
///   consumer attached after history was written starts where it joins.
#[derive(Debug, Default)]
pub struct SubjectCursors {
    cursors: RwLock<HashMap<(String, EntityId), u64>>,
}

impl SubjectCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, entity_type: &str, subject: &EntityId) -> u64 {
        self.cursors
            .read()
            .ok()
            .and_then(|c| c.get(&(entity_type.to_string(), subject.clone())).copied())
            .unwrap_or(0)
    }

    pub fn check<S: Sourced + ?Sized>(&self, message: &S) -> Result<CursorCheck, DeliveryError> {
        let last = self.last(message.entity_type(), message.subject());
        let found = message.sequence_number();

        if found <= last {
            return Ok(CursorCheck::Duplicate);
        }
        if last != 0 && found != last + 1 {
            return Err(DeliveryError::NonMonotonicSequence {
                subject: message.subject().to_string(),
                last,
                found,
            });
        }
        Ok(CursorCheck::Fresh)
    }

    /// Record `message` as applied.
    pub fn advance<S: Sourced + ?Sized>(&self, message: &S) -> Result<(), DeliveryError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| DeliveryError::handler("cursor lock poisoned"))?;
        let key = (message.entity_type().to_string(), message.subject().clone());
        let entry = cursors.entry(key).or_insert(0);
        *entry = (*entry).max(message.sequence_number());
        Ok(())
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
    }
}

/// Feed `envelopes` through `projection` in order, stopping at the first error.
///
/// Returns how many envelopes updated the projection.
pub fn replay<'a, P>(
    projection: &P,
    envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
) -> Result<usize, DeliveryError>
where
    P: Projection + ?Sized,
{
    let mut updated = 0;
    for envelope in envelopes {
        if projection.apply(envelope)? == Applied::Updated {
            updated += 1;
        }
    }
    Ok(updated)
}
