//! Event publishing/subscription abstraction (mechanics only).
//!
//! The event bus distributes committed events to consumers (projection workers,
//! action workers, live subscribers). It is **not** storage: the event store is the
//! source of truth and the bus only carries what was appended after the fact.
//!
//! Delivery is **at-least-once** and best-effort. A consumer that joins late, or a
//! publish that fails, is recovered by replaying the store; consumers therefore must be
//! idempotent (the runtime deduplicates with per-subject cursors).

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

type Predicate<M> = Box<dyn Fn(&M) -> bool + Send>;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was created
/// (broadcast semantics). An optional predicate drops uninteresting messages before
/// they reach the consumer.
///
/// ```ignore
/// let subscription = bus.subscribe().with_filter(move |env| filter.matches(env));
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => process(event),
///         Err(RecvTimeoutError::Timeout) => continue,      // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,    // bus closed
///     }
/// }
/// ```
///
/// Subscriptions are designed for single-threaded consumption.
pub struct Subscription<M> {
    receiver: Receiver<M>,
    filter: Option<Predicate<M>>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only yield messages accepted by `predicate`.
    pub fn with_filter(mut self, predicate: impl Fn(&M) -> bool + Send + 'static) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, message: &M) -> bool {
        self.filter.as_ref().is_none_or(|f| f(message))
    }

    /// Block until the next accepted message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        loop {
            let message = self.receiver.recv()?;
            if self.accepts(&message) {
                return Ok(message);
            }
        }
    }

    /// Try to receive an accepted message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        loop {
            let message = self.receiver.try_recv()?;
            if self.accepts(&message) {
                return Ok(message);
            }
        }
    }

    /// Block for up to `timeout` waiting for an accepted message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.receiver.recv_timeout(remaining)?;
            if self.accepts(&message) {
                return Ok(message);
            }
        }
    }
}

impl<M> core::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// Command → Entity Core → Event Store (append) → Event Bus (publish) → Consumers
///                                                                       ├─ View projections
///                                                                       ├─ Actions
///                                                                       └─ Live subscribers
/// ```
///
/// `publish()` can fail; the entity core logs the failure and relies on store replay.
/// The trait requires `Send + Sync` so one bus can be shared by every entity core.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
