use super::worker::{BatchChannels, Worker, WorkerContext};
use crate::error::AggregatorError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Owns the lifecycle of every worker a pipeline spawns.
///
/// Each batch gets a fresh set of workers via [`WorkerPool::start`]; the
/// pool tracks them so that [`WorkerPool::shutdown`] can stop and await all
/// of them, across batches.
#[derive(Debug)]
pub struct WorkerPool {
    worker_count: usize,
    shutdown: CancellationToken,
    shutdown_once: OnceCell<()>,
    tracker: TaskTracker,
    active: Arc<AtomicUsize>,
    next_id: AtomicUsize,
    /// Serializes "check shutdown then spawn" against "signal shutdown"
    spawn_lock: Mutex<()>,
}

/// Decrements the active-worker count when a worker task ends, panics included.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, AggregatorError> {
        if worker_count == 0 {
            return Err(AggregatorError::config("worker count must be positive"));
        }

        Ok(Self {
            worker_count,
            shutdown: CancellationToken::new(),
            shutdown_once: OnceCell::new(),
            tracker: TaskTracker::new(),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicUsize::new(0),
            spawn_lock: Mutex::new(()),
        })
    }

    /// Workers spawned per batch.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Worker tasks currently running.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been signalled.
    pub async fn shutdown_signalled(&self) {
        self.shutdown.cancelled().await
    }

    /// Stop signal for one batch. Fires on its own or when the pool shuts down.
    pub(crate) fn batch_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Spawn `worker_count` workers for one batch.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::PipelineShutdown`] once shutdown has been
    /// signalled; no worker is spawned in that case.
    pub(crate) fn start(
        &self,
        ctx: &WorkerContext,
        channels: &BatchChannels,
    ) -> Result<Vec<JoinHandle<usize>>, AggregatorError> {
        let _spawning = self.spawn_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_shut_down() {
            return Err(AggregatorError::PipelineShutdown);
        }

        let handles = (0..self.worker_count)
            .map(|_| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let worker = Worker::new(id, ctx.clone(), channels.clone());

                self.active.fetch_add(1, Ordering::SeqCst);
                let guard = ActiveGuard(self.active.clone());

                self.tracker.spawn(async move {
                    let _guard = guard;
                    worker.run().await
                })
            })
            .collect();

        debug!(workers = self.worker_count, "batch workers started");
        Ok(handles)
    }

    /// Stop every worker and wait for all of them to exit.
    ///
    /// Idempotent and safe to call concurrently: every caller returns only
    /// after the workers are gone.
    pub async fn shutdown(&self) {
        self.shutdown_once
            .get_or_init(|| async {
                {
                    let _spawning = self.spawn_lock.lock().unwrap_or_else(PoisonError::into_inner);
                    info!(active = self.active_workers(), "shutting down worker pool");
                    self.shutdown.cancel();
                }
                self.tracker.close();
                self.tracker.wait().await;
                debug!("worker pool drained");
            })
            .await;
    }
}
