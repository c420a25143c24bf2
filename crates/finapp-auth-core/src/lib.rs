//! Authentication session manager for the finapp mobile client.
//!
//! Submits sign-up and log-in credentials to the finapp service, validates
//! the response, and keeps the resulting access/refresh tokens in secure
//! storage for later authenticated requests.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use finapp_auth_core::{AuthConfig, KeyringStore, LoginCredentials, SessionManager};
//!
//! let config = AuthConfig::new("https://api.example.com");
//! let store = Arc::new(KeyringStore::new(config.keyring_service.clone()));
//! let manager = SessionManager::new(config, store)?;
//!
//! manager.log_in(LoginCredentials::new("a@b.com", "pw123")).await?;
//! let header = manager.authorization_header().await;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod store;

pub use api::{HttpTransport, Transport, TransportResponse, MAX_RESPONSE_BYTES};
pub use auth::{
    AuthResult, AuthState, Credentials, LoginCredentials, Session, SessionManager,
    SignupCredentials,
};
pub use config::AuthConfig;
pub use error::AuthError;
pub use store::{EncryptedFileStore, KdfParams, KeyringStore, MemoryStore, SecureStore, StoreError};
