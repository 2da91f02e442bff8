//! # Content Aggregator Library
//!
//! A bounded, rate-limited pipeline that fetches a batch of items
//! concurrently, runs every payload through a processing stage and reports
//! successes and per-item failures together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use content_aggregator_lib::{HtmlProcessor, HttpFetcher, Pipeline};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(
//!         Arc::new(HttpFetcher::new()?),
//!         Arc::new(HtmlProcessor::new()),
//!         3, // workers
//!         2, // fetches per second
//!     )?;
//!
//!     let items = vec![
//!         "https://example.org".to_string(),
//!         "https://example.com".to_string(),
//!     ];
//!     let (results, status) = pipeline
//!         .run(&CancellationToken::new(), &items)
//!         .await
//!         .into_parts();
//!
//!     for result in &results {
//!         println!("{} - {}", result.source, result.title);
//!     }
//!     if let Err(e) = status {
//!         eprintln!("{}", e);
//!     }
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Fixed worker pool**: exactly N workers per batch, one shared job queue
//! - **Admission control**: a token-bucket rate gate shared by all workers
//! - **Partial failures**: every item yields one result or one stage-tagged error
//! - **Cooperative cancellation**: batches stop promptly on a cancellation token
//! - **Idempotent shutdown**: concurrent callers all wait for the same drain
//! - **Pluggable stages**: bring your own [`Fetcher`] and [`Processor`]

// Re-export main public API types and functions
// This makes them available as content_aggregator_lib::TypeName
pub use capabilities::{Fetcher, Processor, RawPayload};
pub use concurrent::{RateGate, WorkerPool};
pub use config::{
    load_env_config, load_env_config_from, parse_duration, ConfigManager, DefaultsConfig,
    EnvConfig, FileConfig, OutputConfig,
};
pub use error::{AggregatorError, OutcomeError, Stage};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use types::{
    BatchOutcome, PageContent, PipelineConfig, ProcessedResult, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_PERMITS_PER_SECOND, DEFAULT_USER_AGENT, DEFAULT_WORKER_COUNT,
};
pub use utils::{normalize_items, parse_item_list, read_items_from_file, validate_item};

#[cfg(feature = "html")]
pub use capabilities::HtmlProcessor;
#[cfg(feature = "http")]
pub use capabilities::HttpFetcher;

// Internal modules - these are not part of the public API
mod capabilities;
mod concurrent;
mod config;
mod error;
mod pipeline;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AggregatorError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Get library information for debugging or display purposes.
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        author: AUTHOR,
        features: get_enabled_features(),
    }
}

/// Information about the library build and features
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub version: &'static str,
    pub author: &'static str,
    pub features: Vec<&'static str>,
}

/// Get list of enabled features at compile time
#[allow(clippy::vec_init_then_push)]
fn get_enabled_features() -> Vec<&'static str> {
    let mut features = Vec::new();

    #[cfg(feature = "http")]
    features.push("http");

    #[cfg(feature = "html")]
    features.push("html");

    features
}
