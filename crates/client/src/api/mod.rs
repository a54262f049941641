//! Backend file-storage API.
//!
//! [`FileApi`] is the seam between the controller and the HTTP backend.
//! [`HttpFileApi`] is the reqwest implementation used in production; tests
//! substitute an in-memory implementation.

pub mod http;

use async_trait::async_trait;
use protocol::{
    DeleteResponse, DownloadUrlResponse, FileListResponse, Identity, ProtocolError, QuerySpec,
    UploadFile, UploadResponse,
};
use thiserror::Error;

pub use http::HttpFileApi;

/// Errors returned by backend calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. `body` is the error payload rendered for display.
    #[error("{body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Rendered error payload.
        body: String,
    },

    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),

    /// A 2xx response whose body did not match the expected payload.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The request could not be built from its inputs.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type for backend calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Operations offered by the file-storage backend.
///
/// Every call except [`FileApi::fetch_signed`] is authenticated with a bearer
/// token supplied by the caller.
#[async_trait]
pub trait FileApi: Send + Sync {
    /// `GET /files` with the query as parameters.
    async fn list_files(&self, token: &str, query: &QuerySpec) -> ApiResult<FileListResponse>;

    /// `GET /me`.
    async fn me(&self, token: &str) -> ApiResult<Identity>;

    /// `POST /upload` with every file in a single multipart request.
    async fn upload(&self, token: &str, files: Vec<UploadFile>) -> ApiResult<UploadResponse>;

    /// `GET /files/{object_name}/download`.
    async fn download_url(&self, token: &str, object_name: &str)
        -> ApiResult<DownloadUrlResponse>;

    /// `DELETE /files/{object_name}`.
    async fn delete(&self, token: &str, object_name: &str) -> ApiResult<DeleteResponse>;

    /// Fetch the content behind a signed download URL.
    async fn fetch_signed(&self, url: &str) -> ApiResult<Vec<u8>>;
}

/// Render an error payload for display.
///
/// JSON payloads are pretty-printed with two-space indentation. Anything
/// else is shown as-is; an empty body falls back to the status line.
pub fn render_error_body(status: u16, body: &str) -> String {
    if body.trim().is_empty() {
        return format!("HTTP {}", status);
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}
