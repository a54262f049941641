//! Identity provider integration.
//!
//! The controller only sees the [`IdentityProvider`] trait: interactive
//! sign-in, sign-out, an auth-state-change subscription, and on-demand bearer
//! tokens. [`FirebaseAuth`] implements it over the Firebase Auth REST API.

pub mod firebase;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::storage::KeychainError;

pub use firebase::{FirebaseAuth, FirebaseConfig};

/// The identity currently signed in with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider user id. Matches the owner id on file records.
    pub uid: String,
    /// Account email, when the provider reports one.
    pub email: Option<String>,
}

/// Auth-state transitions broadcast by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AuthStateChange {
    SignedIn(AuthUser),
    SignedOut,
}

/// Email/password credentials for interactive sign-in.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Errors raised by identity providers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No user is signed in.
    #[error("Not logged in")]
    NotSignedIn,

    /// The provider refused the request (bad password, revoked token, ...).
    #[error("sign-in rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("{0}")]
    Transport(String),

    /// The provider answered with an unexpected payload.
    #[error("invalid provider response: {0}")]
    Decode(String),

    /// The persisted credential could not be read or written.
    #[error(transparent)]
    Keychain(#[from] KeychainError),
}

/// Result type for identity provider operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// A third-party identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in interactively. Emits [`AuthStateChange::SignedIn`] on success.
    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<AuthUser>;

    /// Sign out. Emits [`AuthStateChange::SignedOut`].
    async fn sign_out(&self) -> AuthResult<()>;

    /// The user currently signed in, if any.
    async fn current_user(&self) -> Option<AuthUser>;

    /// A bearer token for the current user.
    ///
    /// A cached token is returned while it is fresh unless `force_refresh`
    /// is set.
    async fn id_token(&self, force_refresh: bool) -> AuthResult<String>;

    /// Subscribe to auth-state transitions.
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}
