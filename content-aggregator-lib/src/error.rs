//! Error handling for pipeline operations.
//!
//! This module defines the crate-wide error type, the stage an item failed
//! in, and the per-item [`OutcomeError`] that the pipeline reports instead
//! of aborting a batch.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Main error type for pipeline operations.
///
/// Configuration problems are raised at construction time. Per-item failures
/// (rate limit, fetch, process) are wrapped into an [`OutcomeError`] by the
/// worker and never abort the batch. Cancellation aborts the whole run.
#[derive(Debug, Clone)]
pub enum AggregatorError {
    /// Invalid pipeline configuration (missing collaborator, zero workers, etc.)
    ConfigError { message: String },

    /// Rate gate constructed with a non-positive rate or burst
    InvalidRate { permits_per_second: f64, burst: u32 },

    /// A permit could not be obtained before the cancellation signal fired
    RateLimitExceeded { message: String },

    /// The fetch capability failed for an item
    FetchFailed {
        url: String,
        message: String,
        status_code: Option<u16>,
    },

    /// The process capability rejected a payload
    ProcessFailed { message: String },

    /// Transport-level errors (connection refused, DNS, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// Operation exceeded its deadline; `duration` is `None` when the
    /// deadline belonged to a component that does not expose it
    Timeout {
        operation: String,
        duration: Option<Duration>,
    },

    /// Operation abandoned because the cancellation signal fired
    Cancelled { operation: String },

    /// Combined error enumerating every per-item failure of a batch
    BatchFailed { failures: Vec<OutcomeError> },

    /// The pipeline's worker pool has been retired
    PipelineShutdown,

    /// File I/O errors when reading item lists or config files
    FileError { path: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl AggregatorError {
    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new rate-limit error.
    pub fn rate_limited<M: Into<String>>(message: M) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
        }
    }

    /// Create a new fetch error.
    pub fn fetch<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a new fetch error carrying the HTTP status code.
    pub fn fetch_with_status<U: Into<String>, M: Into<String>>(
        url: U,
        message: M,
        status_code: u16,
    ) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a new process error.
    pub fn process<M: Into<String>>(message: M) -> Self {
        Self::ProcessFailed {
            message: message.into(),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration: Some(duration),
        }
    }

    /// Create a timeout error whose deadline is not known.
    pub fn timed_out<O: Into<String>>(operation: O) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration: None,
        }
    }

    /// Create a new cancellation error.
    pub fn cancelled<O: Into<String>>(operation: O) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error suggests the operation could succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. }
                | Self::Timeout { .. }
                | Self::RateLimitExceeded { .. }
                | Self::FetchFailed {
                    status_code: Some(429 | 500..=599),
                    ..
                }
        )
    }

    /// Check if this error stems from cancellation, a deadline or shutdown.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. } | Self::Timeout { .. } | Self::PipelineShutdown
        )
    }

    /// Per-item failures carried by a [`AggregatorError::BatchFailed`].
    pub fn failures(&self) -> &[OutcomeError] {
        match self {
            Self::BatchFailed { failures } => failures,
            _ => &[],
        }
    }
}

impl fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::InvalidRate {
                permits_per_second,
                burst,
            } => {
                write!(
                    f,
                    "Invalid rate: {} permits/s with burst {} (both must be positive)",
                    permits_per_second, burst
                )
            }
            Self::RateLimitExceeded { message } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            Self::FetchFailed {
                url,
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "Fetch failed for '{}' (HTTP {}): {}", url, code, message)
                } else {
                    write!(f, "Fetch failed for '{}': {}", url, message)
                }
            }
            Self::ProcessFailed { message } => {
                write!(f, "Processing failed: {}", message)
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::Timeout {
                operation,
                duration: Some(duration),
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::Timeout {
                operation,
                duration: None,
            } => {
                write!(f, "Timed out during: {}", operation)
            }
            Self::Cancelled { operation } => {
                write!(f, "Cancelled during: {}", operation)
            }
            Self::BatchFailed { failures } => {
                write!(
                    f,
                    "encountered {} error{}: ",
                    failures.len(),
                    if failures.len() == 1 { "" } else { "s" }
                )?;
                for (i, failure) in failures.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", failure)?;
                }
                Ok(())
            }
            Self::PipelineShutdown => {
                write!(f, "Pipeline has been shut down")
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for AggregatorError {}

#[cfg(feature = "http")]
impl From<reqwest::Error> for AggregatorError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            Self::timed_out(format!("HTTP request to '{}'", url))
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if let Some(status) = err.status() {
            Self::fetch_with_status(url, err.to_string(), status.as_u16())
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<std::io::Error> for AggregatorError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

/// Pipeline stage in which a work item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Admission control: no permit before cancellation
    #[serde(rename = "rate_limit")]
    RateLimit,

    /// The fetch capability
    #[serde(rename = "fetch")]
    Fetch,

    /// The process capability
    #[serde(rename = "process")]
    Process,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::RateLimit => write!(f, "rate limit"),
            Stage::Fetch => write!(f, "fetch"),
            Stage::Process => write!(f, "process"),
        }
    }
}

/// Failure outcome for one work item.
///
/// Exactly one `OutcomeError` or one processed result is produced for every
/// item a worker dequeues.
#[derive(Debug, Clone)]
pub struct OutcomeError {
    /// The work item that failed
    pub source: String,
    /// Stage the failure happened in
    pub stage: Stage,
    /// Underlying cause
    pub cause: AggregatorError,
}

impl OutcomeError {
    /// Wrap a cause as a failure of `source` at `stage`.
    pub fn new<S: Into<String>>(source: S, stage: Stage, cause: AggregatorError) -> Self {
        Self {
            source: source.into(),
            stage,
            cause,
        }
    }
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error for {}: {}", self.stage, self.source, self.cause)
    }
}

impl std::error::Error for OutcomeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl Serialize for OutcomeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OutcomeError", 3)?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("stage", &self.stage)?;
        state.serialize_field("cause", &self.cause.to_string())?;
        state.end()
    }
}
