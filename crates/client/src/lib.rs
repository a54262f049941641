//! # Cortex Client Library
//!
//! Client-side core of Cortex: a signed-in user browses, uploads, downloads
//! and deletes files held by the Cortex storage backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Front end (CLI, shell, GUI)                     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                   Session & Query Controller                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │   FileApi    │  │ IdentityProvider │  │     Keychain     │  │
//! │  │  (reqwest)   │  │ (Firebase Auth)  │  │   (OS keyring)   │  │
//! │  └──────────────┘  └──────────────────┘  └──────────────────┘  │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`]: backend calls
//! - [`auth`]: identity provider integration
//! - [`controller`]: session state, query state and file operations
//! - [`storage`]: persisted refresh credential

pub mod api;
pub mod auth;
pub mod controller;
pub mod storage;

// Re-export protocol for convenience
pub use protocol;

pub use api::{ApiError, FileApi, HttpFileApi};
pub use auth::{
    AuthError, AuthStateChange, AuthUser, Credentials, FirebaseAuth, FirebaseConfig,
    IdentityProvider,
};
pub use controller::{
    CommandError, CommandResult, Confirm, Controller, ControllerEvent, Session, SessionPhase,
    ViewState,
};
pub use storage::{CredentialStore, KeychainBackend, KeychainError, MemoryKeychain, SystemKeychain};

/// Environment variable overriding the backend base URL.
pub const BACKEND_URL_ENV: &str = "CORTEX_BACKEND_URL";

/// Backend used when nothing else is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Client configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientConfig {
    /// Base URL of the storage backend.
    ///
    /// Can be overridden with the `CORTEX_BACKEND_URL` environment variable.
    /// Falls back to `http://localhost:8000` if the env var is not set or is empty.
    pub backend_url: String,
}

impl ClientConfig {
    /// Create a new ClientConfig from the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config with an explicit backend URL.
    pub fn with_backend_url(url: impl Into<String>) -> Self {
        Self {
            backend_url: url.into(),
        }
    }

    /// Use `configured` unless `CORTEX_BACKEND_URL` is set and non-empty.
    pub fn from_env_or(configured: impl Into<String>) -> Self {
        let backend_url = std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| configured.into());

        Self { backend_url }
    }

    /// An HTTP client for the configured backend.
    pub fn file_api(&self) -> HttpFileApi {
        HttpFileApi::new(self.backend_url.clone())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env_or(DEFAULT_BACKEND_URL)
    }
}
