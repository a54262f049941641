//! # Cortex Protocol Library
//!
//! This crate provides the wire types shared by the Cortex file client and
//! the file-storage backend it talks to.
//!
//! ## Overview
//!
//! - **Payloads**: file listings, upload results, signed download URLs,
//!   delete confirmations, and the caller's identity record
//! - **Queries**: the search/filter/sort parameters of a listing and their
//!   query-string form
//! - **Naming**: object-name path encoding and display-name cleanup
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{encode_object_path, FileType, QuerySpec};
//!
//! let query = QuerySpec {
//!     file_type: FileType::Pdf,
//!     ..Default::default()
//! };
//! assert_eq!(query.to_params().len(), 3);
//!
//! let path = encode_object_path("uid123/report.pdf").unwrap();
//! assert_eq!(path, "uid123/report.pdf");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: request and response payloads
//! - [`query`]: listing query parameters
//! - [`naming`]: object-name and filename helpers
//! - [`error`]: error types

pub mod error;
pub mod messages;
pub mod naming;
pub mod query;

pub use error::{ProtocolError, Result};
pub use messages::{
    DeleteResponse, DownloadUrlResponse, FileListResponse, FileRecord, Identity, UploadFile,
    UploadResponse, UploadedFile,
};
pub use naming::{display_name, encode_object_path};
pub use query::{FileType, Order, QuerySpec, SortBy};
