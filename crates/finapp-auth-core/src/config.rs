//! Session manager configuration.
//!
//! Holds the service base URL, endpoint paths, the storage keys under which
//! tokens are persisted, and the request timeout. The manager receives it
//! at construction; nothing is read from globals.
//!
//! The optional config file lives at `~/.config/finapp-auth/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Application name used for config directory paths
const APP_NAME: &str = "finapp-auth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "https://fin-app-backend-526024683416.asia-northeast1.run.app/";
const DEFAULT_ACCESS_TOKEN_KEY: &str = "auth_token";
const DEFAULT_REFRESH_TOKEN_KEY: &str = "refresh_token";
const DEFAULT_SIGNUP_PATH: &str = "/auth/sign-up";
const DEFAULT_LOGIN_PATH: &str = "/auth/login";
const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Upper bound on a whole credential exchange.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const ENV_BASE_URL: &str = "FINAPP_BASE_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "FINAPP_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub base_url: String,
    pub access_token_key: String,
    pub refresh_token_key: String,
    pub signup_path: String,
    pub login_path: String,
    pub refresh_path: String,
    pub request_timeout_secs: u64,
    pub keyring_service: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token_key: DEFAULT_ACCESS_TOKEN_KEY.to_string(),
            refresh_token_key: DEFAULT_REFRESH_TOKEN_KEY.to_string(),
            signup_path: DEFAULT_SIGNUP_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            keyring_service: crate::store::DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from the default location, or defaults if no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from `FINAPP_BASE_URL` and `FINAPP_REQUEST_TIMEOUT_SECS`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", ENV_REQUEST_TIMEOUT))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Join the base URL and an endpoint path with exactly one slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn signup_url(&self) -> String {
        self.endpoint(&self.signup_path)
    }

    pub fn login_url(&self) -> String {
        self.endpoint(&self.login_path)
    }

    pub fn refresh_url(&self) -> String {
        self.endpoint(&self.refresh_path)
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AuthError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.access_token_key.is_empty() || self.refresh_token_key.is_empty() {
            return Err(AuthError::Config("storage keys must not be empty".to_string()));
        }
        if self.access_token_key == self.refresh_token_key {
            return Err(AuthError::Config(
                "access and refresh tokens need distinct storage keys".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(AuthError::Config("request timeout must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.access_token_key, "auth_token");
        assert_eq!(config.refresh_token_key, "refresh_token");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_joins_with_single_slash() {
        let config = AuthConfig::new("https://api.example.com/");
        assert_eq!(config.login_url(), "https://api.example.com/auth/login");
        assert_eq!(config.signup_url(), "https://api.example.com/auth/sign-up");

        let config = AuthConfig::new("http://localhost:8000");
        assert_eq!(config.endpoint("auth/refresh"), "http://localhost:8000/auth/refresh");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(AuthConfig::new("ftp://example.com").validate().is_err());

        let mut config = AuthConfig::new("https://example.com");
        config.refresh_token_key = config.access_token_key.clone();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = AuthConfig::new("https://example.com");
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"base_url":"http://127.0.0.1:9000"}"#).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.login_path, "/auth/login");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENV_BASE_URL, " http://10.0.2.2:8000 "), (ENV_REQUEST_TIMEOUT, "5")]);
        let mut config = AuthConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url, "http://10.0.2.2:8000");
        assert_eq!(config.request_timeout_secs, 5);

        let mut config = AuthConfig::default();
        let result = config.apply_overrides(|name| {
            (name == ENV_REQUEST_TIMEOUT).then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AuthConfig::new("http://localhost:8000");
        config.request_timeout_secs = 30;
        config.save_to(&path).unwrap();

        assert_eq!(AuthConfig::load_from(&path).unwrap(), config);
        assert_eq!(
            AuthConfig::load_from(dir.path().join("missing.json")).unwrap(),
            AuthConfig::default()
        );
    }
}
