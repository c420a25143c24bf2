use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing required field: {field}")]
    Validation { field: &'static str },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected request with status {status}")]
    RemoteRejected { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not authenticated - no stored session")]
    NotAuthenticated,

    #[error("Secure storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn rejected(status: u16, body: &str) -> Self {
        AuthError::RemoteRejected {
            status,
            body: Self::truncate_body(body),
        }
    }

    /// HTTP status of a rejected request, if this is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuthError::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the server refused the presented credentials or token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status_code(), Some(401) | Some(403))
    }

    /// Whether the caller can sensibly re-prompt or retry the operation.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AuthError::Validation { .. }
            | AuthError::Network(_)
            | AuthError::Timeout(_)
            | AuthError::NotAuthenticated => true,
            AuthError::RemoteRejected { status, .. } => *status < 500 || *status == 503,
            AuthError::MalformedResponse(_) | AuthError::Storage(_) | AuthError::Config(_) => false,
        }
    }
}
