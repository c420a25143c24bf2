//! `reqwest`-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde_json::Value;
use tracing::debug;

use super::{Transport, TransportResponse};
use crate::error::AuthError;

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Largest response body read into memory. Auth responses are a few hundred
/// bytes; anything past this is not one.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// HTTP transport for the authentication endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self, AuthError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn from_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(&self, err: reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::Timeout(self.timeout)
        } else {
            AuthError::Network(err.to_string())
        }
    }

    /// Read the body chunk by chunk, giving up past [`MAX_RESPONSE_BYTES`].
    async fn read_body(&self, mut response: Response) -> Result<String, AuthError> {
        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_BYTES as u64 {
                return Err(too_large());
            }
        }

        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if buf.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(too_large());
            }
            buf.extend_from_slice(&chunk);
        }

        String::from_utf8(buf)
            .map_err(|_| AuthError::MalformedResponse("Response body is not valid UTF-8".to_string()))
    }
}

fn too_large() -> AuthError {
    AuthError::MalformedResponse(format!(
        "Response body exceeds {} bytes",
        MAX_RESPONSE_BYTES
    ))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<TransportResponse, AuthError> {
        debug!(url, "POST");

        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let body = self.read_body(response).await?;

        debug!(url, status, bytes = body.len(), "Response received");
        Ok(TransportResponse { status, body })
    }
}
