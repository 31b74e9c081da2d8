use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::hmac_signer::{HmacSigner, format_signature_header};
use super::schemas::{SIGNATURE_HEADER, TIMESTAMP_HEADER, USER_AGENT};

/// Most of a response body ever read; anything past it is left on the wire.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Error type for HTTP client operations
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response error: status={status}, body={body}")]
    ResponseError {
        status: StatusCode,
        body: String,
        response_time_ms: u64,
    },
}

impl HttpClientError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            HttpClientError::Timeout(timeout)
        } else if err.is_connect() {
            HttpClientError::NetworkError(err.to_string())
        } else if err.is_builder() {
            HttpClientError::InvalidUrl(err.to_string())
        } else {
            HttpClientError::RequestFailed(err.to_string())
        }
    }

    /// HTTP status of the response, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HttpClientError::ResponseError { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }

    /// Text worth keeping on the delivery row: the response body when the
    /// endpoint answered, the error description otherwise.
    pub fn excerpt(&self) -> String {
        match self {
            HttpClientError::ResponseError { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        match self {
            HttpClientError::ResponseError {
                response_time_ms, ..
            } => Some(*response_time_ms),
            _ => None,
        }
    }
}

/// A 2xx answer from a webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status_code: u16,
    pub body: String,
    pub response_time_ms: u64,
}

/// HTTP client wrapper for webhook delivery
#[derive(Debug, Clone)]
pub struct WebhookHttpClient {
    client: Client,
    timeout: Duration,
}

impl WebhookHttpClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a new HTTP client with default timeout (10 seconds)
    pub fn new() -> Result<Self, HttpClientError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Create a new HTTP client with a custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Sign and POST one attempt.
    ///
    /// A fresh timestamp and signature are computed for every call, so
    /// retries of the same payload carry different headers.
    pub async fn send_webhook(
        &self,
        url: &str,
        payload: &str,
        signer: &HmacSigner,
    ) -> Result<WebhookResponse, HttpClientError> {
        debug!(url = %url, "Sending webhook");

        let (signature, timestamp) = signer.sign(payload);
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, format_signature_header(&signature))
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Webhook request failed");
                HttpClientError::from_reqwest(e, self.timeout)
            })?;

        let status = response.status();
        let body = self.read_response_body(response).await?;
        let response_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            url = %url,
            status = %status.as_u16(),
            response_time_ms = %response_time_ms,
            "Webhook response received"
        );

        if !status.is_success() {
            return Err(HttpClientError::ResponseError {
                status,
                body,
                response_time_ms,
            });
        }

        Ok(WebhookResponse {
            status_code: status.as_u16(),
            body,
            response_time_ms,
        })
    }

    /// Read the response body, stopping once `MAX_BODY_SIZE` bytes are in hand.
    async fn read_response_body(&self, mut response: Response) -> Result<String, HttpClientError> {
        let mut body = Vec::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HttpClientError::from_reqwest(e, self.timeout))?
        {
            let room = MAX_BODY_SIZE - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                warn!(max_size = MAX_BODY_SIZE, "Response body too large, truncating");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Get configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
