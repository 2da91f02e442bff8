//! A single pipeline worker.
//!
//! Workers pull items from the shared job queue and run each through the
//! rate gate, the fetch stage and the process stage. Every item a worker
//! dequeues yields exactly one outcome: a stamped result or an error tagged
//! with the stage that failed.

use super::rate_gate::RateGate;
use crate::capabilities::{Fetcher, Processor};
use crate::error::{AggregatorError, OutcomeError, Stage};
use crate::types::ProcessedResult;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Receiving side of a batch's job queue, shared by all of its workers.
pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// Collaborators every worker of a pipeline shares.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub processor: Arc<dyn Processor>,
    pub gate: Arc<RateGate>,
}

/// Everything one batch hands to its workers.
#[derive(Clone)]
pub(crate) struct BatchChannels {
    pub jobs: JobQueue,
    pub results: mpsc::Sender<ProcessedResult>,
    pub errors: mpsc::Sender<OutcomeError>,
    /// Batch stop signal; a child of the pool's shutdown token
    pub cancel: CancellationToken,
}

pub(crate) struct Worker {
    id: usize,
    ctx: WorkerContext,
    channels: BatchChannels,
}

impl Worker {
    pub(crate) fn new(id: usize, ctx: WorkerContext, channels: BatchChannels) -> Self {
        Self { id, ctx, channels }
    }

    /// Process items until the queue is drained, the batch is cancelled or
    /// the pool shuts down. Returns the number of items handled.
    pub(crate) async fn run(self) -> usize {
        let mut handled = 0;
        debug!(worker = self.id, "worker started");

        while let Some(item) = self.next_job().await {
            let delivered = match self.handle(&item).await {
                Ok(result) => self.channels.results.send(result).await.is_ok(),
                Err(error) => {
                    debug!(worker = self.id, %error, "item failed");
                    self.channels.errors.send(error).await.is_ok()
                }
            };
            handled += 1;

            if !delivered {
                // Collector is gone; nobody is waiting for more outcomes
                break;
            }
        }

        debug!(worker = self.id, handled, "worker stopped");
        handled
    }

    /// Dequeue the next item unless a stop signal has fired.
    ///
    /// The stop signal is checked first, so no item is taken off the queue
    /// once the batch is cancelled or the pool is shutting down.
    async fn next_job(&self) -> Option<String> {
        let jobs = &self.channels.jobs;
        tokio::select! {
            biased;
            _ = self.channels.cancel.cancelled() => None,
            item = async { jobs.lock().await.recv().await } => item,
        }
    }

    /// Run one item through admission, fetch and process.
    pub(crate) async fn handle(&self, item: &str) -> Result<ProcessedResult, OutcomeError> {
        let cancel = &self.channels.cancel;

        self.ctx
            .gate
            .acquire(cancel)
            .await
            .map_err(|e| OutcomeError::new(item, Stage::RateLimit, e))?;
        trace!(worker = self.id, item, "permit granted");

        // A panicking stage still owes this item its one outcome
        let fetch = AssertUnwindSafe(async { self.ctx.fetcher.fetch(cancel, item).await });
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AggregatorError::cancelled(format!("fetching {}", item))),
            payload = fetch.catch_unwind() => payload.unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                warn!(worker = self.id, item, %message, "fetcher panicked");
                Err(AggregatorError::fetch(item, format!("fetcher panicked: {}", message)))
            }),
        }
        .map_err(|e| OutcomeError::new(item, Stage::Fetch, e))?;

        let process = AssertUnwindSafe(async { self.ctx.processor.process(cancel, payload).await });
        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AggregatorError::cancelled(format!("processing {}", item))),
            content = process.catch_unwind() => content.unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                warn!(worker = self.id, item, %message, "processor panicked");
                Err(AggregatorError::process(format!("processor panicked: {}", message)))
            }),
        }
        .map_err(|e| OutcomeError::new(item, Stage::Process, e))?;

        Ok(ProcessedResult::stamp(content, item))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
