//! HTTP transport for the finapp authentication service.
//!
//! The session manager talks to the network only through the [`Transport`]
//! trait, so tests can swap in a fake that counts calls. [`HttpTransport`]
//! is the production implementation on top of `reqwest`.

pub mod client;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AuthError;

pub use client::{HttpTransport, MAX_RESPONSE_BYTES};

/// Raw outcome of a POST: status code and undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url`.
    ///
    /// Only transport-level failures are errors; any HTTP status comes
    /// back as a [`TransportResponse`].
    async fn post_json(&self, url: &str, body: &Value) -> Result<TransportResponse, AuthError>;
}
