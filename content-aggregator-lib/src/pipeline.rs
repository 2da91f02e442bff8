//! Main pipeline implementation.
//!
//! This module provides the [`Pipeline`] that fans a batch of items out to a
//! fixed set of rate-gated workers and fans their outcomes back in.

use crate::capabilities::{Fetcher, Processor};
use crate::concurrent::{BatchChannels, RateGate, WorkerContext, WorkerPool};
use crate::error::{AggregatorError, OutcomeError};
use crate::types::{BatchOutcome, PipelineConfig, ProcessedResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Bounded, rate-limited fetch-and-process pipeline.
///
/// A `Pipeline` owns one [`RateGate`] and one [`WorkerPool`]. Every call to
/// [`Pipeline::run`] spawns `worker_count` workers that share the gate, so
/// the configured rate holds across the whole batch (and across concurrent
/// batches on the same pipeline).
///
/// Per-item failures never abort a batch: they are collected next to the
/// successful results. Only cancellation, a deadline or shutdown cut a run
/// short.
///
/// # Example
///
/// ```rust,no_run
/// use content_aggregator_lib::{HtmlProcessor, HttpFetcher, Pipeline};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(
///         Arc::new(HttpFetcher::new()?),
///         Arc::new(HtmlProcessor::new()),
///         3,
///         2,
///     )?;
///
///     let items = vec!["https://example.org".to_string()];
///     let outcome = pipeline.run(&CancellationToken::new(), &items).await;
///     for result in &outcome.results {
///         println!("{}: {}", result.source, result.title);
///     }
///
///     pipeline.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    processor: Arc<dyn Processor>,
    gate: Arc<RateGate>,
    pool: WorkerPool,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with `worker_count` workers and a rate gate
    /// admitting `permits_per_second` fetches per second (burst of the same
    /// size).
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ConfigError`] if `worker_count` or
    /// `permits_per_second` is zero.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        processor: Arc<dyn Processor>,
        worker_count: usize,
        permits_per_second: u32,
    ) -> Result<Self, AggregatorError> {
        let config = PipelineConfig::default()
            .with_workers(worker_count)
            .with_rate(permits_per_second);
        Self::with_config(fetcher, processor, config)
    }

    /// Create a pipeline from a full configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use content_aggregator_lib::{HtmlProcessor, HttpFetcher, Pipeline, PipelineConfig};
    /// use std::sync::Arc;
    ///
    /// let config = PipelineConfig::default()
    ///     .with_workers(8)
    ///     .with_rate(5)
    ///     .with_burst(10);
    ///
    /// let pipeline = Pipeline::with_config(
    ///     Arc::new(HttpFetcher::with_config(&config).unwrap()),
    ///     Arc::new(HtmlProcessor::new()),
    ///     config,
    /// )
    /// .unwrap();
    /// assert_eq!(pipeline.config().worker_count, 8);
    /// ```
    pub fn with_config(
        fetcher: Arc<dyn Fetcher>,
        processor: Arc<dyn Processor>,
        config: PipelineConfig,
    ) -> Result<Self, AggregatorError> {
        config.validate()?;

        let gate = RateGate::new(
            f64::from(config.permits_per_second),
            config.effective_burst(),
        )
        .map_err(|e| AggregatorError::config(e.to_string()))?;
        let pool = WorkerPool::new(config.worker_count)?;

        Ok(Self {
            fetcher,
            processor,
            gate: Arc::new(gate),
            pool,
            config,
        })
    }

    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Worker tasks currently running, across all batches.
    pub fn active_workers(&self) -> usize {
        self.pool.active_workers()
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    /// Process a batch of items.
    ///
    /// Every dispatched item produces exactly one outcome, which lands in
    /// either `results` (arrival order) or `errors` (collector order). If
    /// `cancel` fires, dispatch stops, collection stops immediately, and the
    /// outcome carries what was collected so far plus a
    /// [`AggregatorError::Cancelled`] abort.
    ///
    /// After [`Pipeline::shutdown`] the outcome is aborted with
    /// [`AggregatorError::PipelineShutdown`] and nothing is dispatched.
    pub async fn run(&self, cancel: &CancellationToken, items: &[String]) -> BatchOutcome {
        let span = info_span!("batch", items = items.len(), workers = self.pool.worker_count());
        self.run_batch(cancel, items).instrument(span).await
    }

    async fn run_batch(&self, cancel: &CancellationToken, items: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        if self.pool.is_shut_down() {
            outcome.aborted = Some(AggregatorError::PipelineShutdown);
            return outcome;
        }
        if items.is_empty() {
            debug!("empty batch");
            return outcome;
        }

        info!("batch started");

        let capacity = items.len();
        let (job_tx, job_rx) = mpsc::channel::<String>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel(capacity);
        let (error_tx, mut error_rx) = mpsc::channel(capacity);

        let batch_cancel = self.pool.batch_token();
        // Stops this batch's workers however the run ends
        let _stop_workers = batch_cancel.clone().drop_guard();

        let ctx = WorkerContext {
            fetcher: self.fetcher.clone(),
            processor: self.processor.clone(),
            gate: self.gate.clone(),
        };
        let channels = BatchChannels {
            jobs: Arc::new(Mutex::new(job_rx)),
            results: result_tx,
            errors: error_tx,
            cancel: batch_cancel,
        };

        let workers = match self.pool.start(&ctx, &channels) {
            Ok(workers) => workers,
            Err(e) => {
                outcome.aborted = Some(e);
                return outcome;
            }
        };
        // Workers hold the only senders, so the outcome channels close once they exit
        drop(channels);

        for item in items {
            if let Some(reason) = self.stop_reason(cancel) {
                warn!(
                    dispatched = outcome.dispatched,
                    skipped = items.len() - outcome.dispatched,
                    "dispatch stopped early"
                );
                outcome.aborted = Some(reason);
                break;
            }
            // Capacity equals the batch size, so this only fails once every worker is gone
            if job_tx.try_send(item.clone()).is_err() {
                break;
            }
            outcome.dispatched += 1;
        }
        drop(job_tx);

        self.collect_outcomes(cancel, &mut outcome, &mut result_rx, &mut error_rx)
            .await;

        if let Some(reason) = &outcome.aborted {
            warn!(
                results = outcome.results.len(),
                errors = outcome.errors.len(),
                dispatched = outcome.dispatched,
                %reason,
                "batch aborted"
            );
            return outcome;
        }

        // Queue is closed and drained, so every worker is already on its way out
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker task failed");
            }
        }

        info!(
            results = outcome.results.len(),
            errors = outcome.errors.len(),
            "batch finished"
        );
        outcome
    }

    /// Receive outcomes until every dispatched item has one or the batch
    /// must stop. Sets `outcome.aborted` when collection ends early.
    async fn collect_outcomes(
        &self,
        cancel: &CancellationToken,
        outcome: &mut BatchOutcome,
        result_rx: &mut mpsc::Receiver<ProcessedResult>,
        error_rx: &mut mpsc::Receiver<OutcomeError>,
    ) {
        let mut results_open = true;
        let mut errors_open = true;
        while outcome.aborted.is_none() && outcome.completed() < outcome.dispatched {
            if !results_open && !errors_open {
                // Every worker is gone, yet some dispatched items have no outcome
                outcome.aborted = Some(AggregatorError::internal(format!(
                    "workers exited with {} of {} outcomes delivered",
                    outcome.completed(),
                    outcome.dispatched
                )));
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.aborted = Some(AggregatorError::cancelled("batch collection"));
                }
                _ = self.pool.shutdown_signalled() => {
                    outcome.aborted = Some(AggregatorError::PipelineShutdown);
                }
                result = result_rx.recv(), if results_open => match result {
                    Some(result) => outcome.results.push(result),
                    None => results_open = false,
                },
                error = error_rx.recv(), if errors_open => match error {
                    Some(error) => outcome.errors.push(error),
                    None => errors_open = false,
                },
            }
        }
    }

    /// Why the current batch must stop, if it must.
    fn stop_reason(&self, cancel: &CancellationToken) -> Option<AggregatorError> {
        if cancel.is_cancelled() {
            Some(AggregatorError::cancelled("batch dispatch"))
        } else if self.pool.is_shut_down() {
            Some(AggregatorError::PipelineShutdown)
        } else {
            None
        }
    }

    /// Process a batch under a deadline.
    ///
    /// Behaves like [`Pipeline::run`], except that when `timeout` elapses
    /// first the batch is stopped and the abort is reported as
    /// [`AggregatorError::Timeout`].
    pub async fn run_with_timeout(
        &self,
        cancel: &CancellationToken,
        items: &[String],
        timeout: Duration,
    ) -> BatchOutcome {
        let deadline = cancel.child_token();
        let run = self.run(&deadline, items);
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => outcome,
            _ = tokio::time::sleep(timeout) => {
                deadline.cancel();
                let mut outcome = run.await;
                if !cancel.is_cancelled()
                    && matches!(outcome.aborted, Some(AggregatorError::Cancelled { .. }))
                {
                    outcome.aborted = Some(AggregatorError::timeout("batch", timeout));
                }
                outcome
            }
        }
    }

    /// Process a batch and fail on any per-item failure or abort.
    pub async fn collect(
        &self,
        cancel: &CancellationToken,
        items: &[String],
    ) -> Result<Vec<ProcessedResult>, AggregatorError> {
        let (results, status) = self.run(cancel, items).await.into_parts();
        status.map(|_| results)
    }

    /// Retire the worker pool.
    ///
    /// Stops every worker, including those of a batch still running, and
    /// waits until all of them have exited. Safe to call any number of
    /// times, also concurrently; every call waits for the same drain.
    pub async fn shutdown(&self) -> Result<(), AggregatorError> {
        self.pool.shutdown().await;
        Ok(())
    }
}

/// Builder for [`Pipeline`].
///
/// Unlike [`Pipeline::new`], the collaborators may be left unset; `build`
/// reports that as a configuration error.
#[derive(Default)]
pub struct PipelineBuilder {
    fetcher: Option<Arc<dyn Fetcher>>,
    processor: Option<Arc<dyn Processor>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn fetcher<F: Fetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn shared_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn processor<P: Processor + 'static>(mut self, processor: P) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn shared_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, worker_count: usize) -> Self {
        self.config.worker_count = worker_count;
        self
    }

    pub fn rate(mut self, permits_per_second: u32) -> Self {
        self.config.permits_per_second = permits_per_second;
        self
    }

    pub fn burst(mut self, burst: u32) -> Self {
        self.config.burst = Some(burst);
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ConfigError`] if a collaborator is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<Pipeline, AggregatorError> {
        let fetcher = self
            .fetcher
            .ok_or_else(|| AggregatorError::config("fetcher is required"))?;
        let processor = self
            .processor
            .ok_or_else(|| AggregatorError::config("processor is required"))?;
        Pipeline::with_config(fetcher, processor, self.config)
    }
}
