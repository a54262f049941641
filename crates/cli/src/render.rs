//! Terminal rendering of listings and identity records.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use client::ViewState;
use protocol::{FileRecord, Identity};
use serde::Serialize;

/// JSON shape printed by `ls --json`.
#[derive(Debug, Serialize)]
pub struct ListingJson<'a> {
    pub query: String,
    pub admin: bool,
    pub my_files: Vec<&'a FileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_files: Option<&'a [FileRecord]>,
}

impl<'a> ListingJson<'a> {
    pub fn from_state(state: &'a ViewState) -> Self {
        Self {
            query: state.query.to_string(),
            admin: state.session.is_admin,
            my_files: state.my_files(),
            all_files: state.admin_files(),
        }
    }
}

/// Render the "my files" table and, for administrators, the all-users table.
pub fn listing(state: &ViewState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Query: {}", state.query);
    let _ = writeln!(out);
    let _ = writeln!(out, "My files");
    out.push_str(&files_table(&state.my_files(), false));

    if let Some(all) = state.admin_files() {
        let all: Vec<&FileRecord> = all.iter().collect();
        let _ = writeln!(out);
        let _ = writeln!(out, "All files (admin)");
        out.push_str(&files_table(&all, true));
    }
    out
}

/// Render files as an ASCII table, with an OWNER column when `with_owner`.
pub fn files_table(files: &[&FileRecord], with_owner: bool) -> String {
    if files.is_empty() {
        return "No files.\n".to_string();
    }

    let name_width = files
        .iter()
        .map(|f| f.display_name().chars().count())
        .max()
        .unwrap_or(4)
        .clamp(4, 40);
    let owner_width = if with_owner {
        files
            .iter()
            .map(|f| f.owner_id.chars().count())
            .max()
            .unwrap_or(5)
            .clamp(5, 28)
    } else {
        0
    };
    let owner_cell = |owner: &str| {
        if with_owner {
            format!("{:<owner_width$}  ", truncate_str(owner, owner_width))
        } else {
            String::new()
        }
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:<6}  {:>9}  {:<16}  {}{}",
        "NAME",
        "TYPE",
        "SIZE",
        "UPDATED",
        owner_cell("OWNER"),
        "OBJECT",
    );
    let rule = name_width + 45 + if with_owner { owner_width + 2 } else { 0 };
    let _ = writeln!(out, "{}", "-".repeat(rule));

    for file in files {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<6}  {:>9}  {:<16}  {}{}",
            truncate_str(file.display_name(), name_width),
            truncate_str(file.file_type().unwrap_or("-"), 6),
            file.size.map(format_size).unwrap_or_else(|| "-".to_string()),
            file.timestamp
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            owner_cell(&file.owner_id),
            file.object_name,
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Total: {} file(s)", files.len());
    out
}

/// Render an identity record.
pub fn identity(identity: &Identity) -> String {
    format!(
        "uid:      {}\nemail:    {}\nis_admin: {}\n",
        identity.uid,
        identity.email.as_deref().unwrap_or("-"),
        identity.is_admin
    )
}

/// Format a byte count with a binary unit suffix.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format a timestamp as `YYYY-MM-DD HH:MM` (UTC).
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M").to_string()
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
