//! REST API client for the Scanning Worker HTTP endpoints.
//!
//! Wraps scan submission, status polling and result retrieval using
//! [`reqwest`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::worker::DetectedEndpoint;

/// Per-request timeout. A slow call is retried on the next poll tick.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for a single Scanning Worker instance.
#[derive(Debug, Clone)]
pub struct ScannerApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct StartScanRequest<'a> {
    url: &'a str,
    branch: &'a str,
}

/// Response returned by `POST /scan` after the worker accepts a job.
#[derive(Debug, Deserialize)]
pub struct StartScanResponse {
    /// Worker-assigned scan identifier.
    pub scan_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Body of `GET /scan/{id}`.
#[derive(Debug, Deserialize)]
pub struct WorkerScanStatus {
    #[serde(default)]
    pub id: String,
    /// One of `queued`, `scanning`, `completed`, `failed`.
    pub status: String,
    #[serde(default)]
    pub files_scanned: i64,
    #[serde(default)]
    pub endpoint_count: i64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `GET /scan/{id}/endpoints`.
#[derive(Debug, Deserialize)]
pub struct EndpointsResponse {
    #[serde(default)]
    pub scan_id: String,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub endpoints: Option<Vec<DetectedEndpoint>>,
}

/// Errors from the Scanning Worker REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ScannerApiError {
    /// The HTTP request itself failed (network, DNS, timeout, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The worker returned a non-2xx status code.
    #[error("Scanner API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ScannerApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://localhost:3001`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the worker to scan `url` at `branch`.
    pub async fn start_scan(
        &self,
        url: &str,
        branch: &str,
    ) -> Result<StartScanResponse, ScannerApiError> {
        let response = self
            .client
            .post(format!("{}/scan", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&StartScanRequest { url, branch })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current state of a worker scan.
    pub async fn get_status(&self, scan_id: &str) -> Result<WorkerScanStatus, ScannerApiError> {
        let response = self
            .client
            .get(format!("{}/scan/{}", self.base_url, scan_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the endpoints detected by a completed scan.
    pub async fn get_endpoints(&self, scan_id: &str) -> Result<EndpointsResponse, ScannerApiError> {
        let response = self
            .client
            .get(format!("{}/scan/{}/endpoints", self.base_url, scan_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Return the response unchanged on a 2xx status, or an
    /// [`ScannerApiError::ApiError`] carrying the status and body.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ScannerApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ScannerApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ScannerApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
