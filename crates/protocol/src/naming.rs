//! Object-name and filename helpers.

use crate::error::{ProtocolError, Result};

/// Encode an object name for use as a URL path segment sequence.
///
/// Each `/`-separated segment is percent-encoded on its own and the
/// separators are kept, so `uid123/report.pdf` stays addressable as
/// `uid123/report.pdf` rather than `uid123%2Freport.pdf`.
pub fn encode_object_path(object_name: &str) -> Result<String> {
    if object_name.is_empty() {
        return Err(ProtocolError::InvalidObjectName(object_name.to_string()));
    }

    let encoded: Vec<String> = object_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();

    Ok(encoded.join("/"))
}

/// Strip the owner-disambiguation prefix from a stored filename.
///
/// Everything up to and including the first `_` is removed. Names without an
/// underscore are returned unchanged.
pub fn display_name(filename: &str) -> &str {
    match filename.split_once('_') {
        Some((_, rest)) => rest,
        None => filename,
    }
}
