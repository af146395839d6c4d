//! Anthropic Messages API client.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tandem_types::ApiError;

use crate::retry::{RetryConfig, is_retryable};
use crate::stream::EventStream;
use crate::wire::{WireRequest, WireResponse};

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        })
    }

    /// Set the retry configuration for transient errors (429, 529, 5xx, network).
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Send a non-streaming request and decode the full response.
    pub async fn create_message(&self, request: &WireRequest) -> Result<WireResponse, ApiError> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(|e| ApiError::Network(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::StreamParse(format!("response body: {e}")))
    }

    /// Send a streaming request and return a stream of events.
    pub async fn create_message_stream(
        &self,
        request: &WireRequest,
    ) -> Result<EventStream, ApiError> {
        let response = self.send(request).await?;
        Ok(EventStream::new(response.bytes_stream()))
    }

    /// POST the request, retrying transient failures with backoff.
    async fn send(&self, request: &WireRequest) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| ApiError::Auth {
                message: "Invalid API key format".into(),
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let body = serde_json::to_string(request).map_err(|e| ApiError::BadRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let attempts = self.retry_config.max_retries + 1;
        let mut attempt = 0;
        loop {
            tracing::debug!("POST {url} (attempt {}/{attempts})", attempt + 1);

            let result = self
                .http
                .post(&url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            let (err, retry_after) = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = parse_retry_after(response.headers());
                    let body_text = response.text().await.unwrap_or_default();
                    (classify_error(status, &body_text, retry_after), retry_after)
                }
                Err(e) if e.is_timeout() => (ApiError::Timeout, None),
                Err(e) => (ApiError::Network(e.to_string()), None),
            };

            if !is_retryable(&err) || attempt + 1 >= attempts {
                return Err(err);
            }

            let delay = self.retry_config.delay_ms(attempt, retry_after);
            tracing::warn!(
                "Retryable API error (attempt {}/{attempts}): {err}. Retrying in {delay}ms...",
                attempt + 1,
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }
}

/// Parse the `retry-after` header value as seconds and convert to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

/// Classify an HTTP error response into a typed ApiError.
fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> ApiError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => ApiError::Auth { message },
        400 | 404 | 413 => ApiError::BadRequest { message },
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after,
        },
        529 => ApiError::Overloaded,
        _ => ApiError::Server { status, message },
    }
}
