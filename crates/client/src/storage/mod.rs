//! Credential storage for the Cortex client.
//!
//! The identity provider's refresh credential is kept in the OS keychain so
//! a later process can restore the signed-in session.

pub mod keychain;

pub use keychain::{
    CredentialStore, KeychainBackend, KeychainError, KeychainResult, MemoryKeychain,
    StoredCredential, SystemKeychain,
};
