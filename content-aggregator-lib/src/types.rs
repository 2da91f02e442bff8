//! Core data types for the fetch-and-process pipeline.
//!
//! This module defines the results produced by the pipeline, the per-batch
//! outcome handed back to callers, and the configuration options.

use crate::error::{AggregatorError, OutcomeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of workers per batch.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Default steady-state fetch rate.
pub const DEFAULT_PERMITS_PER_SECOND: u32 = 2;

/// Default cap on a fetched body (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default `User-Agent` sent by the HTTP fetcher.
pub const DEFAULT_USER_AGENT: &str = "ContentAggregator/1.0";

/// Fields extracted from a payload by a processor.
///
/// This is a processed result before the worker stamps it with its source
/// item and a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// Document title
    pub title: String,

    /// Short description (e.g. `<meta name="description">`)
    pub description: String,

    /// Keywords in document order
    pub keywords: Vec<String>,
}

/// A successfully processed work item.
///
/// Created by [`ProcessedResult::stamp`] once the processor succeeded; it is
/// not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResult {
    /// Document title
    pub title: String,

    /// Short description
    pub description: String,

    /// Keywords in document order
    pub keywords: Vec<String>,

    /// When the worker finished processing the item
    pub timestamp: DateTime<Utc>,

    /// The work item this result was produced for
    pub source: String,
}

impl ProcessedResult {
    /// Stamp processor output with its source item and the current time.
    pub fn stamp<S: Into<String>>(content: PageContent, source: S) -> Self {
        Self {
            title: content.title,
            description: content.description,
            keywords: content.keywords,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Everything one pipeline run produced.
///
/// Created fresh for every run and handed over to the caller; the pipeline
/// keeps no reference to it.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Successful results in arrival order (not input order)
    pub results: Vec<ProcessedResult>,

    /// Per-item failures in the order the collector received them
    pub errors: Vec<OutcomeError>,

    /// Number of items handed to the workers
    pub dispatched: usize,

    /// Batch-level abort (cancellation, deadline or shutdown), if any
    pub aborted: Option<AggregatorError>,
}

impl BatchOutcome {
    /// Number of items that produced an outcome.
    pub fn completed(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    /// Whether collection was cut short by a batch-level abort.
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Whether every dispatched item succeeded and the run was not aborted.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.errors.is_empty()
    }

    /// The error the run reports, if any.
    ///
    /// A batch-level abort takes precedence; otherwise every per-item failure
    /// is combined into one [`AggregatorError::BatchFailed`].
    pub fn error(&self) -> Option<AggregatorError> {
        if let Some(aborted) = &self.aborted {
            return Some(aborted.clone());
        }
        if self.errors.is_empty() {
            None
        } else {
            Some(AggregatorError::BatchFailed {
                failures: self.errors.clone(),
            })
        }
    }

    /// Split into the collected results and the run's error.
    pub fn into_parts(self) -> (Vec<ProcessedResult>, Result<(), AggregatorError>) {
        let status = match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        (self.results, status)
    }
}

/// Configuration options for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of workers spawned per batch
    /// Default: 3
    pub worker_count: usize,

    /// Steady-state fetch rate
    /// Default: 2 permits per second
    pub permits_per_second: u32,

    /// Burst capacity of the rate gate
    /// Default: None (same as `permits_per_second`)
    pub burst: Option<u32>,

    /// Deadline for a whole batch
    /// Default: 30 seconds
    #[serde(skip)]
    pub batch_timeout: Duration,

    /// Per-request timeout for the HTTP fetcher
    /// Default: 10 seconds
    #[serde(skip)]
    pub fetch_timeout: Duration,

    /// Bodies longer than this are truncated
    /// Default: 10 MiB
    pub max_body_bytes: usize,

    /// `User-Agent` header for the HTTP fetcher
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            permits_per_second: DEFAULT_PERMITS_PER_SECOND,
            burst: None,
            batch_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Set the number of workers per batch.
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the steady-state fetch rate.
    pub fn with_rate(mut self, permits_per_second: u32) -> Self {
        self.permits_per_second = permits_per_second;
        self
    }

    /// Set an explicit burst capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Set the batch deadline.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Set the per-request fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the body size cap.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Burst capacity actually used by the rate gate.
    pub fn effective_burst(&self) -> u32 {
        self.burst.unwrap_or(self.permits_per_second)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), AggregatorError> {
        if self.worker_count == 0 {
            return Err(AggregatorError::config("worker count must be positive"));
        }
        if self.permits_per_second == 0 {
            return Err(AggregatorError::config(
                "permits per second must be positive",
            ));
        }
        if self.effective_burst() == 0 {
            return Err(AggregatorError::config("burst must be positive"));
        }
        if self.max_body_bytes == 0 {
            return Err(AggregatorError::config("max body size must be positive"));
        }
        if self.batch_timeout.is_zero() {
            return Err(AggregatorError::config("batch timeout must be positive"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(AggregatorError::config("fetch timeout must be positive"));
        }
        Ok(())
    }
}
