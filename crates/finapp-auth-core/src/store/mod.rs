//! Secure storage backends for persisting session tokens.
//!
//! This module provides the [`SecureStore`] trait and its implementations:
//!
//! - [`KeyringStore`] - OS keychain (macOS Keychain, Windows Credential
//!   Manager, Linux kernel keyring)
//! - [`EncryptedFileStore`] - passphrase-sealed vault file for hosts
//!   without a keychain
//! - [`MemoryStore`] - in-process storage for tests
//!
//! Token values are never logged by any backend.

mod encrypted;
mod keyring;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use self::encrypted::{EncryptedFileStore, KdfParams};
pub use self::keyring::{KeyringStore, DEFAULT_SERVICE_NAME};
pub use self::memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Keychain error: {0}")]
    Keyring(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

/// Minimal key-value contract the session manager needs from secure storage.
///
/// Implementations must be safe to share between tasks. Reads may run
/// concurrently; concurrent writes to the same key are serialized by the
/// backend.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, overwriting any existing one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Succeeds when the key is already absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Backend name, used in logs.
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<T: SecureStore + ?Sized> SecureStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: SecureStore + ?Sized> SecureStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
