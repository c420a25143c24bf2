//! Authentication session management.
//!
//! This module provides:
//! - `SessionManager`: credential submission, token refresh and secure
//!   token persistence
//! - `SignupCredentials` / `LoginCredentials`: transient credential shapes
//! - `Session` / `AuthResult` / `AuthState`: what the UI reads back
//!
//! Sessions are never cached in memory; they are read from the secure store
//! on demand.

pub mod credentials;
pub mod manager;
pub mod session;

pub use credentials::{Credentials, LoginCredentials, SignupCredentials};
pub use manager::SessionManager;
pub use session::{AuthResult, AuthState, Session};
