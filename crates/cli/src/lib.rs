//! Cortex command line.
//!
//! Front end over the client controller: one-shot subcommands plus an
//! interactive shell.

pub mod config;
pub mod logging;
pub mod render;
pub mod shell;

use std::path::PathBuf;

use client::{CommandError, CommandResult};
use protocol::UploadFile;

/// Read files selected for upload. The part name is the path's file name.
pub async fn read_uploads(paths: &[PathBuf]) -> CommandResult<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CommandError::new("IO_ERROR", format!("not a file: {}", path.display()))
            })?;
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| CommandError::new("IO_ERROR", format!("{}: {}", path.display(), e)))?;
        files.push(UploadFile::new(filename, content));
    }
    Ok(files)
}

/// Ask the user to confirm on the terminal. Anything but an explicit yes declines.
pub fn confirm_prompt(prompt: &str) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}
