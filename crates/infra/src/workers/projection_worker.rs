use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{error, warn};

use eventide_events::{DeliveryError, Sourced, Subscription};

use crate::config::RetryPolicy;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Delivery settings for one worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub tick: Duration,
    pub retry: RetryPolicy,
    /// Entered by the worker thread so handlers can spawn onto the async runtime.
    pub runtime: Option<Handle>,
}

/// Generic delivery worker loop, feeding projections and actions.
///
/// - Delivers the backlog first, then the live subscription
/// - Retries retryable handler failures with exponential backoff
/// - Logs and skips a message once the retry budget is exhausted
/// - Supports graceful shutdown, also while backing off
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes `backlog`, then messages from `sub`.
    ///
    /// `handler` must be idempotent (at-least-once delivery safe).
    pub fn spawn<M, H>(
        name: impl Into<String>,
        backlog: Vec<M>,
        sub: Subscription<M>,
        options: WorkerOptions,
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        M: Sourced + Send + 'static,
        H: FnMut(&M) -> Result<(), DeliveryError> + Send + 'static,
    {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_name = name.clone();
        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            let _runtime = options.runtime.as_ref().map(Handle::enter);
            worker_loop(
                &thread_name,
                backlog,
                sub,
                &shutdown_rx,
                &options,
                &mut handler,
            )
        })?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H>(
    name: &str,
    backlog: Vec<M>,
    sub: Subscription<M>,
    shutdown_rx: &mpsc::Receiver<()>,
    options: &WorkerOptions,
    handler: &mut H,
) where
    M: Sourced,
    H: FnMut(&M) -> Result<(), DeliveryError>,
{
    for msg in backlog {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }
        if !deliver(name, &msg, shutdown_rx, &options.retry, handler) {
            return;
        }
    }

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(options.tick) {
            Ok(msg) => {
                if !deliver(name, &msg, shutdown_rx, &options.retry, handler) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Deliver one message. Returns `false` when shutdown was requested while backing off.
fn deliver<M, H>(
    name: &str,
    msg: &M,
    shutdown_rx: &mpsc::Receiver<()>,
    retry: &RetryPolicy,
    handler: &mut H,
) -> bool
where
    M: Sourced,
    H: FnMut(&M) -> Result<(), DeliveryError>,
{
    let mut attempt = 1u32;
    loop {
        let err = match handler(msg) {
            Ok(()) => return true,
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!(
                worker = name,
                entity_type = msg.entity_type(),
                subject = %msg.subject(),
                sequence_number = msg.sequence_number(),
                code = err.code(),
                error = %err,
                "delivery failed permanently, skipping"
            );
            return true;
        }

        if attempt >= retry.max_attempts {
            error!(
                worker = name,
                entity_type = msg.entity_type(),
                subject = %msg.subject(),
                sequence_number = msg.sequence_number(),
                attempts = attempt,
                error = %err,
                "delivery retry budget exhausted, skipping"
            );
            return true;
        }

        let delay = retry.backoff_for(attempt);
        warn!(
            worker = name,
            subject = %msg.subject(),
            sequence_number = msg.sequence_number(),
            attempt,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "delivery failed, retrying"
        );
        match shutdown_rx.recv_timeout(delay) {
            Err(mpsc::RecvTimeoutError::Timeout) => attempt += 1,
            _ => return false,
        }
    }
}
