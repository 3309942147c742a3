//! HTTP client for the region wire contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;

use crate::array::{ArrayFetcher, RawSampleBlock, RegionRequest, SampleDtype};
use crate::coords::ArrayRegion;
use crate::error::BackendError;
use crate::server::ErrorResponse;

use super::{parse_shape, DTYPE_HEADER, SHAPE_HEADER};

/// Default number of attempts per fetch (1 initial + 2 retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts; doubles per retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

// =============================================================================
// RemoteArrayClient
// =============================================================================

/// `ArrayFetcher` over HTTP: `POST {endpoint}/region`.
///
/// Transient faults (`Unavailable`) are retried with exponential backoff
/// up to the configured attempt count. `RegionOutOfRange` and protocol
/// errors are permanent and returned immediately.
pub struct RemoteArrayClient {
    http: reqwest::Client,
    endpoint: String,
    max_attempts: u32,
    backoff: Duration,
}

impl RemoteArrayClient {
    /// Create a client for the service at `endpoint` (scheme + authority,
    /// e.g. `http://127.0.0.1:9090`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Override the retry policy.
    ///
    /// `max_attempts` counts the initial attempt; 1 disables retries.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn fetch_once(&self, request: &RegionRequest) -> Result<RawSampleBlock, BackendError> {
        let url = format!("{}/region", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| format!("status {}", status));
            return Err(match status {
                StatusCode::BAD_REQUEST => BackendError::RegionOutOfRange {
                    dataset: request.dataset.clone(),
                    message,
                },
                s if s.is_server_error() => BackendError::Unavailable(message),
                s => BackendError::Protocol(format!("unexpected status {}: {}", s, message)),
            });
        }

        let dtype = header_value(&response, DTYPE_HEADER)
            .and_then(|v| SampleDtype::parse(&v))
            .ok_or_else(|| {
                BackendError::Protocol(format!("missing or invalid {} header", DTYPE_HEADER))
            })?;
        let shape = header_value(&response, SHAPE_HEADER)
            .and_then(|v| parse_shape(&v))
            .ok_or_else(|| {
                BackendError::Protocol(format!("missing or invalid {} header", SHAPE_HEADER))
            })?;

        let data = response
            .bytes()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let block = RawSampleBlock::new(data, dtype, shape);
        if block.data.len() != block.expected_len() {
            return Err(BackendError::Protocol(format!(
                "body length {} does not match shape {}x{} of {}",
                block.data.len(),
                shape[0],
                shape[1],
                dtype.name(),
            )));
        }
        Ok(block)
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[async_trait]
impl ArrayFetcher for RemoteArrayClient {
    async fn fetch(&self, region: &ArrayRegion) -> Result<RawSampleBlock, BackendError> {
        let request = RegionRequest::from(region);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(&request).await {
                Ok(block) => return Ok(block),
                Err(BackendError::Unavailable(reason)) if attempt < self.max_attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        attempt,
                        dataset = %request.dataset,
                        "region fetch failed, retrying in {:?}: {}",
                        delay,
                        reason
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
