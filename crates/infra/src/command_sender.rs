//! One-way command dispatch for side effects.

use std::sync::{Arc, Mutex, PoisonError};

use eventide_events::SideEffect;

/// Fire-and-forget command dispatch.
///
/// `send` must not block on the target command: implementations hand the side effect
/// off (spawn, enqueue) and return. Failures are logged, never reported back.
pub trait CommandSender: Send + Sync {
    fn send(&self, side_effect: SideEffect);
}

impl<S> CommandSender for Arc<S>
where
    S: CommandSender + ?Sized,
{
    fn send(&self, side_effect: SideEffect) {
        (**self).send(side_effect)
    }
}

/// Sender that logs and drops every side effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct DroppingSender;

impl CommandSender for DroppingSender {
    fn send(&self, side_effect: SideEffect) {
        tracing::warn!(
            entity_type = side_effect.entity_type(),
            entity_id = %side_effect.entity_id(),
            "no command sender configured, dropping side effect"
        );
    }
}

/// Sender that only records what it was asked to send (tests, dry runs).
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SideEffect>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SideEffect> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandSender for RecordingSender {
    fn send(&self, side_effect: SideEffect) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(side_effect);
    }
}
