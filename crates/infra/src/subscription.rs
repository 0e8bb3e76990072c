//! Subscription routing: live delivery, replay from the store, and consumer workers.
//!
//! Projections attach with catch-up: the live subscription is opened first, then the
//! store backlog is read, so an event committed in between is seen at least once (the
//! projection's cursors drop the duplicate). Actions attach live only.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::runtime::Handle;

use eventide_events::{
    Action, CursorCheck, DeliveryError, EventBus, EventEnvelope, Projection, SubjectCursors,
    Subscription, SubscriptionFilter,
};

use crate::command_sender::CommandSender;
use crate::config::RuntimeConfig;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::workers::{ProjectionWorker, WorkerHandle, WorkerOptions};

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("cannot read backlog: {0}")]
    Store(#[from] EventStoreError),

    #[error("cannot spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

type Envelope = EventEnvelope<JsonValue>;

/// Connects consumers to the committed event flow of one store and bus.
pub struct SubscriptionRouter<S, B> {
    store: S,
    bus: B,
    config: RuntimeConfig,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl<S, B> SubscriptionRouter<S, B>
where
    S: EventStore + Clone + 'static,
    B: EventBus<Envelope> + 'static,
{
    pub fn new(store: S, bus: B, config: RuntimeConfig) -> Self {
        Self {
            store,
            bus,
            config,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Live subscription to events matching `filter`, from now on.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription<Envelope> {
        self.bus
            .subscribe()
            .with_filter(move |envelope: &Envelope| filter.matches(envelope))
    }

    /// Committed events matching `filter` with a global position after `after`.
    pub async fn replay(
        &self,
        filter: &SubscriptionFilter,
        after: u64,
    ) -> Result<Vec<Envelope>, EventStoreError> {
        read_matching(&self.store, filter, after).await
    }

    /// Feed `projection` its backlog, then live events, on a dedicated worker.
    ///
    /// A sequence gap seen live (a publish was lost) triggers a catch-up read of the
    /// affected entity type from the store.
    pub async fn attach_projection(
        &self,
        projection: Arc<dyn Projection>,
    ) -> Result<(), AttachError> {
        let sources = projection.sources();
        let live = self.subscribe_any(sources.clone());

        let mut backlog = Vec::new();
        for source in &sources {
            backlog.extend(self.replay(source, 0).await?);
        }
        backlog.sort_by_key(|e| e.global_position());
        backlog.dedup_by_key(|e| e.global_position());
        let backlog_len = backlog.len();

        let store = self.store.clone();
        let runtime = Handle::try_current().ok();
        let name = projection.name().to_string();
        let target = Arc::clone(&projection);
        let handler = move |envelope: &Envelope| match target.apply(envelope) {
            Ok(_) => Ok(()),
            Err(DeliveryError::NonMonotonicSequence { subject, last, found }) => {
                tracing::warn!(
                    projection = target.name(),
                    subject = %subject,
                    last,
                    found,
                    "sequence gap, catching up from the store"
                );
                catch_up(target.as_ref(), &store, runtime.as_ref(), envelope.entity_type())
            }
            Err(err) => Err(err),
        };

        let worker = ProjectionWorker::spawn(
            format!("projection-{name}"),
            backlog,
            live,
            self.worker_options(None),
            handler,
        )?;
        tracing::info!(projection = %name, backlog = backlog_len, "projection attached");
        self.push_worker(worker);
        Ok(())
    }

    /// Feed `action` live events; its side effects go to `sender`.
    ///
    /// Deliveries are deduplicated per subject. Must be called from within a tokio
    /// runtime for senders that spawn async work.
    pub fn attach_action(
        &self,
        action: Arc<dyn Action>,
        sender: Arc<dyn CommandSender>,
    ) -> Result<(), AttachError> {
        let live = self.subscribe_any(action.subscriptions());
        let cursors = SubjectCursors::new();
        let name = action.name().to_string();

        let handler = move |envelope: &Envelope| {
            match cursors.check(envelope) {
                Ok(CursorCheck::Duplicate) => return Ok(()),
                Ok(CursorCheck::Fresh) => {}
                // Event-type filters skip sequence numbers; live-only consumers carry on.
                Err(err) => tracing::debug!(action = action.name(), error = %err, "sequence gap"),
            }
            for side_effect in action.react(envelope)? {
                sender.send(side_effect);
            }
            cursors.advance(envelope)
        };

        let worker = ProjectionWorker::spawn(
            format!("action-{name}"),
            Vec::new(),
            live,
            self.worker_options(Handle::try_current().ok()),
            handler,
        )?;
        tracing::info!(action = %name, "action attached");
        self.push_worker(worker);
        Ok(())
    }

    /// Stop every worker and wait for them to exit.
    pub fn shutdown(&self) {
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            tracing::debug!(worker = worker.name(), "stopping worker");
            worker.shutdown();
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn subscribe_any(&self, filters: Vec<SubscriptionFilter>) -> Subscription<Envelope> {
        self.bus
            .subscribe()
            .with_filter(move |envelope: &Envelope| filters.iter().any(|f| f.matches(envelope)))
    }

    fn worker_options(&self, runtime: Option<Handle>) -> WorkerOptions {
        WorkerOptions {
            tick: self.config.worker_tick,
            retry: self.config.delivery,
            runtime,
        }
    }

    fn push_worker(&self, worker: WorkerHandle) {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(worker);
    }
}

async fn read_matching<S: EventStore>(
    store: &S,
    filter: &SubscriptionFilter,
    after: u64,
) -> Result<Vec<Envelope>, EventStoreError> {
    let stored = store.read_all_after(filter.entity_type(), after).await?;
    Ok(stored
        .iter()
        .map(StoredEvent::to_envelope)
        .filter(|e| filter.matches(e))
        .collect())
}

/// Re-deliver every stored event of `entity_type`; already applied ones are skipped.
fn catch_up<S: EventStore>(
    projection: &dyn Projection,
    store: &S,
    runtime: Option<&Handle>,
    entity_type: &str,
) -> Result<(), DeliveryError> {
    let Some(runtime) = runtime else {
        return Err(DeliveryError::handler(
            "no async runtime available to read the store",
        ));
    };
    let filter = SubscriptionFilter::entity(entity_type);
    let backlog = runtime
        .block_on(read_matching(store, &filter, 0))
        .map_err(|e| DeliveryError::handler(e.to_string()))?;
    for envelope in &backlog {
        projection.apply(envelope)?;
    }
    Ok(())
}
