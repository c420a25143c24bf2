use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Fields submitted to create a new account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SignupCredentials {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Fields submitted to open a session for an existing account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Either credential shape, as handed over by the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Signup(SignupCredentials),
    Login(LoginCredentials),
}

fn require(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation { field });
    }
    Ok(())
}

impl SignupCredentials {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Reject blank fields before anything is sent over the wire.
    pub fn validate(&self) -> Result<(), AuthError> {
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

impl Credentials {
    pub fn validate(&self) -> Result<(), AuthError> {
        match self {
            Credentials::Signup(c) => c.validate(),
            Credentials::Login(c) => c.validate(),
        }
    }
}

impl From<SignupCredentials> for Credentials {
    fn from(c: SignupCredentials) -> Self {
        Credentials::Signup(c)
    }
}

impl From<LoginCredentials> for Credentials {
    fn from(c: LoginCredentials) -> Self {
        Credentials::Login(c)
    }
}

// Passwords must never reach logs, so Debug is written by hand.
impl fmt::Debug for SignupCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupCredentials")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
