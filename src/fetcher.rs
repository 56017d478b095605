//! One bounded-timeout request per source.
//!
//! The fetcher never fails past its own boundary: every call resolves to a
//! [`RawResponse`] or a [`SourceFailure`]. There are no retries.

use crate::error::{DiscoveryError, Result, SourceFailure};
use crate::registry::SourceDescriptor;
use std::time::Duration;
use tracing::debug;

/// Per-source request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Successful response body plus status
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Shared HTTP client for source requests
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscoveryError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue the query request for `source`
    pub async fn fetch(
        &self,
        source: &SourceDescriptor,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<RawResponse, SourceFailure> {
        let url = source
            .build_query_url(query, max_results)
            .map_err(|e| SourceFailure::Network(e.to_string()))?;

        debug!(source = source.name, url = %url, "Fetching source");

        let mut request = self.client.get(url).timeout(self.timeout);
        for (name, value) in source.request_headers() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceFailure::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        debug!(source = source.name, status = status.as_u16(), bytes = body.len(), "Source responded");

        Ok(RawResponse {
            status: status.as_u16(),
            body,
        })
    }
}
