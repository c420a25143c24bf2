use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::credentials::{Credentials, LoginCredentials, SignupCredentials};
use super::session::{AuthResult, AuthState, Session};
use crate::api::{HttpTransport, Transport};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::SecureStore;

/// Mediates between the UI and the authentication service, and owns the
/// secure token store.
///
/// Tokens are written only after a response has a success status and parses
/// cleanly. Exchanges that write (`sign_up`, `log_in`, `refresh_session`,
/// `clear_session`) go through a single-writer gate; `get_session` does not.
pub struct SessionManager {
    config: AuthConfig,
    store: Arc<dyn SecureStore>,
    transport: Arc<dyn Transport>,
    gate: Mutex<()>,
    refreshing: AtomicBool,
}

/// How a successful exchange treats a token the response left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    /// Sign-up and log-in: the response is the whole new session.
    Replace,
    /// Refresh: missing tokens keep their stored value.
    Rotate,
}

/// Clears the refreshing flag however the refresh ends, including when the
/// future is dropped mid-flight.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionManager {
    /// Create a manager that talks HTTP via `reqwest`.
    pub fn new(config: AuthConfig, store: Arc<dyn SecureStore>) -> Result<Self, AuthError> {
        let transport = HttpTransport::with_timeout(config.request_timeout())?;
        Self::with_transport(config, store, Arc::new(transport))
    }

    pub fn with_transport(
        config: AuthConfig,
        store: Arc<dyn SecureStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        debug!(base_url = %config.base_url, store = store.name(), "Session manager ready");
        Ok(Self {
            config,
            store,
            transport,
            gate: Mutex::new(()),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Create an account and store the tokens the service hands back.
    pub async fn sign_up(&self, credentials: SignupCredentials) -> Result<AuthResult, AuthError> {
        credentials.validate()?;
        let body = json!({
            "first_name": credentials.first_name,
            "last_name": credentials.last_name,
            "email": credentials.email,
            "password": credentials.password,
        });
        drop(credentials);

        let _gate = self.gate.lock().await;
        let result = self.exchange(&self.config.signup_url(), &body).await?;
        self.persist_tokens(&result, Persist::Replace).await?;
        info!(
            has_access_token = result.access_token().is_some(),
            "Sign-up succeeded"
        );
        Ok(result)
    }

    /// Open a session for an existing account.
    pub async fn log_in(&self, credentials: LoginCredentials) -> Result<AuthResult, AuthError> {
        credentials.validate()?;
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        drop(credentials);

        let _gate = self.gate.lock().await;
        let result = self.exchange(&self.config.login_url(), &body).await?;
        self.persist_tokens(&result, Persist::Replace).await?;
        info!(
            has_access_token = result.access_token().is_some(),
            "Log-in succeeded"
        );
        Ok(result)
    }

    /// Submit either credential shape to its matching endpoint.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<AuthResult, AuthError> {
        match credentials {
            Credentials::Signup(c) => self.sign_up(c).await,
            Credentials::Login(c) => self.log_in(c).await,
        }
    }

    /// Read the stored tokens. Never fails; unreadable keys count as absent.
    pub async fn get_session(&self) -> Session {
        let (access_token, refresh_token) = futures::join!(
            self.read_key(&self.config.access_token_key),
            self.read_key(&self.config.refresh_token_key),
        );
        Session {
            access_token,
            refresh_token,
        }
    }

    /// Remove both tokens. Succeeds when nothing is stored.
    pub async fn clear_session(&self) -> Result<(), AuthError> {
        let _gate = self.gate.lock().await;
        self.clear_keys().await?;
        info!("Session cleared");
        Ok(())
    }

    /// Trade the stored refresh token for new tokens.
    ///
    /// If the service rejects the refresh token (401/403) the session is
    /// cleared before the error is returned. Other failures leave the stored
    /// tokens as they were.
    pub async fn refresh_session(&self) -> Result<AuthResult, AuthError> {
        let _gate = self.gate.lock().await;

        let refresh_token = self
            .read_key(&self.config.refresh_token_key)
            .await
            .ok_or(AuthError::NotAuthenticated)?;

        let outcome = {
            let _refreshing = RefreshGuard::enter(&self.refreshing);
            let body = json!({ "refresh_token": refresh_token });
            self.exchange(&self.config.refresh_url(), &body).await
        };

        match outcome {
            Ok(result) => {
                self.persist_tokens(&result, Persist::Rotate).await?;
                info!(
                    rotated_refresh_token = result.refresh_token().is_some(),
                    "Session refreshed"
                );
                Ok(result)
            }
            Err(err) if err.is_unauthorized() => {
                warn!(status = ?err.status_code(), "Refresh token rejected, clearing session");
                if let Err(clear_err) = self.clear_keys().await {
                    warn!(error = %clear_err, "Failed to clear rejected session");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn state(&self) -> AuthState {
        if self.refreshing.load(Ordering::SeqCst) {
            return AuthState::Refreshing;
        }
        if self.get_session().await.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    /// `Authorization` header value for requests made on the user's behalf.
    pub async fn authorization_header(&self) -> Option<String> {
        self.get_session().await.bearer()
    }

    async fn exchange(&self, url: &str, body: &Value) -> Result<AuthResult, AuthError> {
        let timeout = self.config.request_timeout();
        let response = tokio::time::timeout(timeout, self.transport.post_json(url, body))
            .await
            .map_err(|_| AuthError::Timeout(timeout))??;

        if !response.is_success() {
            warn!(url, status = response.status, "Authentication request rejected");
            return Err(AuthError::rejected(response.status, &response.body));
        }

        AuthResult::parse(&response.body)
    }

    async fn persist_tokens(&self, result: &AuthResult, mode: Persist) -> Result<(), AuthError> {
        let keys = [
            (self.config.access_token_key.as_str(), result.access_token()),
            (self.config.refresh_token_key.as_str(), result.refresh_token()),
        ];

        // Snapshot first so a failed write can put the old pair back
        let mut previous: Vec<(&str, Option<String>)> = Vec::with_capacity(keys.len());
        for (key, _) in keys {
            previous.push((key, self.store.get(key).await?));
        }

        let mut writes = 0;
        for ((key, value), (_, old)) in keys.into_iter().zip(&previous) {
            let outcome = match (value, mode) {
                (Some(value), _) => self.store.set(key, value).await,
                // A new identity must not inherit the last one's tokens
                (None, Persist::Replace) if old.is_some() => self.store.delete(key).await,
                (None, _) => continue,
            };
            if let Err(err) = outcome {
                self.restore(&previous).await;
                return Err(err.into());
            }
            writes += 1;
        }

        debug!(writes, "Tokens persisted");
        Ok(())
    }

    async fn restore(&self, previous: &[(&str, Option<String>)]) {
        for (key, old) in previous {
            let undo = match old {
                Some(value) => self.store.set(key, value).await,
                None => self.store.delete(key).await,
            };
            if let Err(err) = undo {
                warn!(key, error = %err, "Failed to restore previous token");
            }
        }
    }

    async fn clear_keys(&self) -> Result<(), AuthError> {
        let access = self.store.delete(&self.config.access_token_key).await;
        let refresh = self.store.delete(&self.config.refresh_token_key).await;
        access?;
        refresh?;
        Ok(())
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, store = self.store.name(), error = %err, "Failed to read secure storage");
                None
            }
        }
    }
}
