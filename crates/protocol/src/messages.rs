//! Payloads exchanged with the file-storage backend.
//!
//! All payloads are JSON. Field names follow the backend's wire format; the
//! Rust-side names are chosen for the client (`uid` becomes `owner_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::naming::display_name;

// ============================================================================
// File Listing
// ============================================================================

/// A stored file as enumerated by `GET /files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Opaque storage key. May contain `/`.
    pub object_name: String,
    /// Stored filename, possibly prefixed with `<disambiguator>_`.
    pub filename: String,
    /// Identifier of the owning user.
    #[serde(rename = "uid")]
    pub owner_id: String,
    /// Size in bytes, when known.
    #[serde(default)]
    pub size: Option<u64>,
    /// Last-modified time, when known. Sent as RFC 3339 with any offset.
    #[serde(default, rename = "updated_at")]
    pub timestamp: Option<DateTime<Utc>>,
    /// MIME type reported by storage.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Lower-cased file extension.
    #[serde(default)]
    pub ext: Option<String>,
    /// Storage bucket holding the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl FileRecord {
    /// The filename shown to users, without the disambiguation prefix.
    pub fn display_name(&self) -> &str {
        display_name(&self.filename)
    }

    /// The file's type: its extension, falling back to the MIME type.
    pub fn file_type(&self) -> Option<&str> {
        self.ext.as_deref().or(self.content_type.as_deref())
    }
}

/// Response body of `GET /files`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileListResponse {
    /// Whether the caller has administrator visibility.
    #[serde(default)]
    pub admin: bool,
    /// Files visible to the caller under the requested query.
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

// ============================================================================
// Upload
// ============================================================================

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Name sent as the multipart part's filename.
    pub filename: String,
    /// MIME type of the part.
    pub mime_type: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

impl UploadFile {
    /// Create an upload with a MIME type derived from the filename.
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = crate::query::FileType::mime_for_filename(&filename).to_string();
        Self {
            filename,
            mime_type,
            content,
        }
    }
}

/// One entry of a successful upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub object_name: String,
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Response body of `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub uploaded: Vec<UploadedFile>,
}

// ============================================================================
// Download / Delete
// ============================================================================

/// Response body of `GET /files/{object_name}/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    /// Short-lived signed URL for the object.
    pub url: String,
}

/// Response body of `DELETE /files/{object_name}`.
///
/// The backend may answer with an empty body, so every field defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub object_name: Option<String>,
}

// ============================================================================
// Identity
// ============================================================================

/// Response body of `GET /me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}
