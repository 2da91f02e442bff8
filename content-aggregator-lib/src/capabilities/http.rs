//! HTTP fetch stage backed by `reqwest`.
//!
//! Items are treated as absolute `http`/`https` URLs. Only a `200 OK`
//! response counts as success, and bodies are read chunk by chunk so an
//! oversized page is cut at the configured limit instead of being buffered
//! whole.

use super::{Fetcher, RawPayload};
use crate::error::AggregatorError;
use crate::types::{PipelineConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// HTTP fetcher for page retrieval.
#[derive(Clone)]
pub struct HttpFetcher {
    /// Shared connection pool
    http_client: reqwest::Client,
    /// Per-request timeout, covering the body read; unknown for a wrapped client
    timeout: Option<Duration>,
    /// Bodies are truncated at this many bytes
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher with a 10 second timeout and a 10 MiB body cap.
    pub fn new() -> Result<Self, AggregatorError> {
        Self::build(Duration::from_secs(10), DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT)
    }

    /// Create a fetcher from the pipeline's fetch settings.
    pub fn with_config(config: &PipelineConfig) -> Result<Self, AggregatorError> {
        Self::build(
            config.fetch_timeout,
            config.max_body_bytes,
            &config.user_agent,
        )
    }

    /// Wrap an existing client. The client's own timeout still applies.
    pub fn with_client(http_client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            http_client,
            timeout: None,
            max_body_bytes,
        }
    }

    fn build(
        timeout: Duration,
        max_body_bytes: usize,
        user_agent: &str,
    ) -> Result<Self, AggregatorError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                AggregatorError::network_with_source("Failed to create HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            timeout: Some(timeout),
            max_body_bytes,
        })
    }

    /// Body size cap in bytes.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    fn map_request_error(&self, url: &str, err: reqwest::Error) -> AggregatorError {
        if err.is_timeout() {
            let operation = format!("fetching '{}'", url);
            match self.timeout {
                Some(timeout) => AggregatorError::timeout(operation, timeout),
                None => AggregatorError::timed_out(operation),
            }
        } else if err.is_connect() {
            AggregatorError::network_with_source(format!("Connection to '{}' failed", url), err.to_string())
        } else {
            AggregatorError::fetch(url, err.to_string())
        }
    }
}

/// Parse and check an item as an absolute HTTP(S) URL.
fn parse_url(item: &str) -> Result<Url, AggregatorError> {
    let trimmed = item.trim();
    if trimmed.is_empty() {
        return Err(AggregatorError::fetch(item, "URL cannot be empty"));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| AggregatorError::fetch(trimmed, format!("invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AggregatorError::fetch(
            trimmed,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        item: &str,
    ) -> Result<RawPayload, AggregatorError> {
        let url = parse_url(item)?;
        let url_text = url.to_string();

        let request = self.http_client.get(url).send();
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AggregatorError::cancelled(format!("fetching '{}'", url_text)));
            }
            response = request => response.map_err(|e| self.map_request_error(&url_text, e))?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AggregatorError::fetch_with_status(
                &url_text,
                format!("unexpected status {}", status),
                status.as_u16(),
            ));
        }

        let mut body = Vec::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AggregatorError::cancelled(format!("reading body of '{}'", url_text)));
                }
                chunk = response.chunk() => chunk.map_err(|e| self.map_request_error(&url_text, e))?,
            };

            let Some(chunk) = chunk else {
                break;
            };

            let remaining = self.max_body_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!(url = %url_text, limit = self.max_body_bytes, "response body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url_text, bytes = body.len(), "fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_accepts_http_and_https() {
        assert!(parse_url("https://example.org").is_ok());
        assert!(parse_url("  http://example.org/path?q=1  ").is_ok());
    }

    #[test]
    fn test_parse_url_rejects_bad_input() {
        assert!(matches!(
            parse_url(""),
            Err(AggregatorError::FetchFailed { .. })
        ));
        assert!(parse_url("   ").is_err());
        assert!(parse_url("not a url").is_err());
        assert!(parse_url("ftp://example.org/file").is_err());
    }

    #[test]
    fn test_config_sets_body_limit() {
        let config = PipelineConfig::default().with_max_body_bytes(1024);
        let fetcher = HttpFetcher::with_config(&config).unwrap();
        assert_eq!(fetcher.max_body_bytes(), 1024);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_network() {
        let fetcher = HttpFetcher::new().unwrap();
        let cancel = CancellationToken::new();
        let err = fetcher.fetch(&cancel, "::nope::").await.unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_request() {
        let fetcher = HttpFetcher::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Unroutable address; the biased select returns before any I/O is polled
        let err = fetcher.fetch(&cancel, "http://10.255.255.1/").await.unwrap_err();
        assert!(matches!(err, AggregatorError::Cancelled { .. }));
    }

    /// Accepts connections into its backlog but never answers.
    fn silent_server() -> (std::net::TcpListener, String) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_configured_timeout_is_reported() {
        let (_listener, url) = silent_server();
        let config = PipelineConfig::default().with_fetch_timeout(Duration::from_millis(100));
        let fetcher = HttpFetcher::with_config(&config).unwrap();

        let err = fetcher.fetch(&CancellationToken::new(), &url).await.unwrap_err();
        assert!(matches!(
            err,
            AggregatorError::Timeout {
                duration: Some(d),
                ..
            } if d == Duration::from_millis(100)
        ));
    }

    #[tokio::test]
    async fn test_wrapped_client_timeout_has_no_deadline() {
        let (_listener, url) = silent_server();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let fetcher = HttpFetcher::with_client(client, 1024);

        let err = fetcher.fetch(&CancellationToken::new(), &url).await.unwrap_err();
        assert!(matches!(err, AggregatorError::Timeout { duration: None, .. }));
        assert!(err.to_string().starts_with("Timed out during: fetching"));
    }
}
