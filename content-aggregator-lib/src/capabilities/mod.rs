//! Pluggable fetch and process stages.
//!
//! The pipeline never knows how an item is retrieved or what the payload
//! looks like; it only drives these two traits. Implementations must be safe
//! to call from several workers at once.

#[cfg(feature = "html")]
mod html;
#[cfg(feature = "http")]
mod http;

#[cfg(feature = "html")]
pub use html::HtmlProcessor;
#[cfg(feature = "http")]
pub use http::HttpFetcher;

use crate::error::AggregatorError;
use crate::types::PageContent;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Raw bytes returned by a [`Fetcher`].
pub type RawPayload = Vec<u8>;

/// Retrieves the raw payload for one work item.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `item`, giving up when `cancel` fires.
    ///
    /// The pipeline also abandons the call itself on cancellation, so an
    /// implementation that ignores the token is still bounded.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        item: &str,
    ) -> Result<RawPayload, AggregatorError>;
}

/// Turns a raw payload into structured content.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Extract content from `payload`. Ownership of the payload moves here.
    async fn process(
        &self,
        cancel: &CancellationToken,
        payload: RawPayload,
    ) -> Result<PageContent, AggregatorError>;
}
