use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, instrument};

use super::{SecureStore, StoreError};

/// Default keychain service name
pub const DEFAULT_SERVICE_NAME: &str = "finapp-auth";

/// Tokens stored in the OS keychain, one keychain entry per storage key.
///
/// The keychain API is blocking, so every call runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(service: &str, key: &str) -> Result<Entry, StoreError> {
        Entry::new(service, key)
            .map_err(|e| StoreError::Keyring(format!("Failed to create keyring entry: {}", e)))
    }

    async fn run_blocking<T, F>(&self, key: &str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, StoreError> + Send + 'static,
    {
        let entry = Self::entry(&self.service, key)?;
        tokio::task::spawn_blocking(move || op(entry))
            .await
            .map_err(|e| StoreError::Keyring(format!("Keychain task failed: {}", e)))?
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

#[async_trait]
impl SecureStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run_blocking(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keyring(format!(
                "Failed to retrieve value from keychain: {}",
                e
            ))),
        })
        .await
    }

    #[instrument(skip(self, value), fields(service = %self.service))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = value.to_string();
        self.run_blocking(key, move |entry| {
            entry
                .set_password(&value)
                .map_err(|e| StoreError::Keyring(format!("Failed to store value in keychain: {}", e)))
        })
        .await?;
        debug!(key, "Stored keychain entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.run_blocking(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keyring(format!(
                "Failed to delete value from keychain: {}",
                e
            ))),
        })
        .await
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
