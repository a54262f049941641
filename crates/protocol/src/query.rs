//! File-list query parameters.
//!
//! A [`QuerySpec`] is the active search/filter/sort state of a file listing.
//! [`QuerySpec::to_params`] produces the exact query-string pairs sent to
//! `GET /files`: `q` only when the trimmed text is non-empty, `file_type` only
//! when a concrete type is selected, `sort_by` and `order` always.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// File-type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// No filter.
    #[default]
    Any,
    Txt,
    Json,
    Pdf,
}

impl FileType {
    /// The value sent as `file_type`, or `None` when no filter applies.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            FileType::Any => None,
            FileType::Txt => Some("txt"),
            FileType::Json => Some("json"),
            FileType::Pdf => Some("pdf"),
        }
    }

    /// Guess a MIME type for an upload from its file extension.
    pub fn mime_for_filename(filename: &str) -> &'static str {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => "text/plain",
            "json" => "application/json",
            "pdf" => "application/pdf",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param().unwrap_or("any"))
    }
}

impl FromStr for FileType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "any" | "all" => Ok(FileType::Any),
            "txt" => Ok(FileType::Txt),
            "json" => Ok(FileType::Json),
            "pdf" => Ok(FileType::Pdf),
            _ => Err(ProtocolError::InvalidFileType(s.to_string())),
        }
    }
}

/// Sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Size,
}

impl SortBy {
    pub fn as_param(&self) -> &'static str {
        match self {
            SortBy::Date => "date",
            SortBy::Size => "size",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for SortBy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortBy::Date),
            "size" => Ok(SortBy::Size),
            _ => Err(ProtocolError::InvalidSortKey(s.to_string())),
        }
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    pub fn as_param(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for Order {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            _ => Err(ProtocolError::InvalidOrder(s.to_string())),
        }
    }
}

/// The search, filter and sort parameters driving a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Free-text filename search.
    pub text: String,
    /// File-type filter.
    pub file_type: FileType,
    /// Sort key.
    pub sort_by: SortBy,
    /// Sort order.
    pub order: Order,
}

impl QuerySpec {
    /// Query-string pairs for `GET /files`, in a stable order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);

        let text = self.text.trim();
        if !text.is_empty() {
            params.push(("q", text.to_string()));
        }
        if let Some(file_type) = self.file_type.as_param() {
            params.push(("file_type", file_type.to_string()));
        }
        params.push(("sort_by", self.sort_by.as_param().to_string()));
        params.push(("order", self.order.as_param().to_string()));

        params
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text.trim();
        if text.is_empty() {
            write!(f, "type={} sort={} {}", self.file_type, self.sort_by, self.order)
        } else {
            write!(
                f,
                "search={:?} type={} sort={} {}",
                text, self.file_type, self.sort_by, self.order
            )
        }
    }
}
