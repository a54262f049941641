//! Error types for the protocol crate.

use thiserror::Error;

/// Errors raised while building requests from user input.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Query parameters
    /// Unknown file-type filter.
    #[error("invalid file type: {0} (expected one of: any, txt, json, pdf)")]
    InvalidFileType(String),

    /// Unknown sort key.
    #[error("invalid sort key: {0} (expected one of: date, size)")]
    InvalidSortKey(String),

    /// Unknown sort order.
    #[error("invalid sort order: {0} (expected one of: asc, desc)")]
    InvalidOrder(String),

    // Object names
    /// An object name that cannot address a stored file.
    #[error("invalid object name: {0:?}")]
    InvalidObjectName(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
