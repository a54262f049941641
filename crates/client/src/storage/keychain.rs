//! Keychain persistence for the identity provider's refresh credential.
//!
//! This module provides cross-platform keychain access using the `keyring` crate:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (via D-Bus)
//!
//! A [`MemoryKeychain`] backend keeps credentials in process memory only.
//! Tests use it in place of the OS keychain.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The service name used for keychain entries.
const SERVICE_NAME: &str = "cortex";

/// The default key name for the stored credential.
const DEFAULT_KEY_NAME: &str = "refresh_credential";

/// Errors that can occur during keychain operations.
#[derive(Debug, Error)]
pub enum KeychainError {
    /// The requested key was not found in the keychain.
    #[error("Key not found in keychain: {0}")]
    NotFound(String),

    /// Access to the keychain was denied.
    #[error("Keychain access denied: {0}")]
    AccessDenied(String),

    /// The keychain service is unavailable.
    #[error("Keychain service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The stored value could not be encoded or decoded.
    #[error("Credential encoding error: {0}")]
    EncodingError(String),

    /// A platform-specific keychain error occurred.
    #[error("Keychain error: {0}")]
    PlatformError(String),
}

/// Result type for keychain operations.
pub type KeychainResult<T> = Result<T, KeychainError>;

/// Trait for keychain backend implementations.
pub trait KeychainBackend: Send + Sync {
    /// Retrieve a secret from the keychain.
    fn get_secret(&self, service: &str, key: &str) -> KeychainResult<String>;

    /// Store a secret in the keychain.
    fn set_secret(&self, service: &str, key: &str, value: &str) -> KeychainResult<()>;

    /// Delete a secret from the keychain.
    fn delete_secret(&self, service: &str, key: &str) -> KeychainResult<()>;
}

/// Keychain backend using the operating system's credential store.
pub struct SystemKeychain;

impl SystemKeychain {
    fn entry(service: &str, key: &str) -> KeychainResult<keyring::Entry> {
        keyring::Entry::new(service, key).map_err(|e| KeychainError::PlatformError(e.to_string()))
    }
}

/// Map a keyring failure for `key` onto [`KeychainError`].
fn keyring_error(key: &str, error: keyring::Error) -> KeychainError {
    match error {
        keyring::Error::NoEntry => KeychainError::NotFound(key.to_string()),
        keyring::Error::NoStorageAccess(e) => KeychainError::AccessDenied(e.to_string()),
        keyring::Error::PlatformFailure(e) => KeychainError::ServiceUnavailable(e.to_string()),
        keyring::Error::BadEncoding(_) | keyring::Error::TooLong(..) => {
            KeychainError::EncodingError(error.to_string())
        }
        other => KeychainError::PlatformError(other.to_string()),
    }
}

impl KeychainBackend for SystemKeychain {
    fn get_secret(&self, service: &str, key: &str) -> KeychainResult<String> {
        Self::entry(service, key)?
            .get_password()
            .map_err(|e| keyring_error(key, e))
    }

    fn set_secret(&self, service: &str, key: &str, value: &str) -> KeychainResult<()> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(|e| keyring_error(key, e))
    }

    fn delete_secret(&self, service: &str, key: &str) -> KeychainResult<()> {
        Self::entry(service, key)?
            .delete_credential()
            .map_err(|e| keyring_error(key, e))
    }
}

/// In-process keychain backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryKeychain {
    storage: Mutex<HashMap<String, String>>,
}

impl MemoryKeychain {
    /// Create an empty in-memory keychain.
    pub fn new() -> Self {
        Self::default()
    }

    fn make_key(service: &str, key: &str) -> String {
        format!("{}:{}", service, key)
    }

    fn lock(&self) -> KeychainResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.storage
            .lock()
            .map_err(|_| KeychainError::ServiceUnavailable("memory keychain poisoned".to_string()))
    }
}

impl KeychainBackend for MemoryKeychain {
    fn get_secret(&self, service: &str, key: &str) -> KeychainResult<String> {
        self.lock()?
            .get(&Self::make_key(service, key))
            .cloned()
            .ok_or_else(|| KeychainError::NotFound(key.to_string()))
    }

    fn set_secret(&self, service: &str, key: &str, value: &str) -> KeychainResult<()> {
        self.lock()?
            .insert(Self::make_key(service, key), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, service: &str, key: &str) -> KeychainResult<()> {
        match self.lock()?.remove(&Self::make_key(service, key)) {
            Some(_) => Ok(()),
            None => Err(KeychainError::NotFound(key.to_string())),
        }
    }
}

/// The credential persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Provider user id.
    pub uid: String,
    /// Email of the signed-in account, when known.
    pub email: Option<String>,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

/// Keychain-backed store for the refresh credential.
pub struct CredentialStore<B: KeychainBackend> {
    backend: B,
    service: String,
    key_name: String,
}

impl<B: KeychainBackend> CredentialStore<B> {
    /// Create a new CredentialStore with the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            service: SERVICE_NAME.to_string(),
            key_name: DEFAULT_KEY_NAME.to_string(),
        }
    }

    /// Create a new CredentialStore with custom service and key names.
    pub fn with_names(backend: B, service: impl Into<String>, key_name: impl Into<String>) -> Self {
        Self {
            backend,
            service: service.into(),
            key_name: key_name.into(),
        }
    }

    /// Load the stored credential, or `None` if nothing is stored.
    pub fn load(&self) -> KeychainResult<Option<StoredCredential>> {
        match self.backend.get_secret(&self.service, &self.key_name) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| KeychainError::EncodingError(e.to_string())),
            Err(KeychainError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store a credential, replacing any previous one.
    pub fn save(&self, credential: &StoredCredential) -> KeychainResult<()> {
        let raw = serde_json::to_string(credential)
            .map_err(|e| KeychainError::EncodingError(e.to_string()))?;
        self.backend.set_secret(&self.service, &self.key_name, &raw)
    }

    /// Remove the stored credential. Succeeds when nothing is stored.
    pub fn clear(&self) -> KeychainResult<()> {
        match self.backend.delete_secret(&self.service, &self.key_name) {
            Ok(()) | Err(KeychainError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl CredentialStore<SystemKeychain> {
    /// Create a CredentialStore backed by the system keychain.
    pub fn system() -> Self {
        Self::new(SystemKeychain)
    }
}

impl CredentialStore<MemoryKeychain> {
    /// Create a CredentialStore that only lives as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryKeychain::new())
    }
}
