//! Interactive shell.
//!
//! Each line is one command. Query commands mutate the controller's query,
//! which re-fetches the listing; file commands map one-to-one onto controller
//! operations.

use std::path::{Path, PathBuf};

use anyhow::Result;
use client::{CommandResult, Controller};
use protocol::{FileType, Order, SortBy};
use thiserror::Error;

use crate::render;
use crate::{confirm_prompt, read_uploads};

/// Shell command parse errors.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown command: {0} (try `help`)")]
    UnknownCommand(String),

    #[error("{0} requires an argument")]
    MissingArgument(&'static str),

    #[error("{0}")]
    InvalidValue(String),
}

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Empty line.
    Nothing,
    Help,
    Quit,
    /// Print the current listing.
    List,
    Refresh,
    Reset,
    Search(String),
    Type(FileType),
    Sort(SortBy),
    Order(Order),
    Upload(Vec<PathBuf>),
    Download {
        object_name: String,
        dir: Option<PathBuf>,
    },
    Remove(String),
    Me,
}

pub const HELP: &str = "\
Commands:
  ls                         show the current listing
  refresh                    re-fetch the listing
  search [TEXT]              set the search text (empty clears it)
  type any|txt|json|pdf      filter by file type
  sort date|size             sort key
  order asc|desc             sort order
  reset                      restore the default query
  upload PATH...             upload files in one request
  download OBJECT [DIR]      download an object
  rm OBJECT                  delete an object
  me                         show the identity record
  help                       show this help
  quit                       leave the shell";

/// Parse one shell line.
pub fn parse(line: &str) -> Result<ShellCommand, ParseError> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let invalid = |e: protocol::ProtocolError| ParseError::InvalidValue(e.to_string());

    match command.to_ascii_lowercase().as_str() {
        "" => Ok(ShellCommand::Nothing),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        "ls" | "list" => Ok(ShellCommand::List),
        "refresh" => Ok(ShellCommand::Refresh),
        "reset" => Ok(ShellCommand::Reset),
        "me" | "whoami" => Ok(ShellCommand::Me),
        "search" => Ok(ShellCommand::Search(rest.to_string())),
        "type" => required(rest, "type")?
            .parse()
            .map(ShellCommand::Type)
            .map_err(invalid),
        "sort" => required(rest, "sort")?
            .parse()
            .map(ShellCommand::Sort)
            .map_err(invalid),
        "order" => required(rest, "order")?
            .parse()
            .map(ShellCommand::Order)
            .map_err(invalid),
        "upload" => {
            required(rest, "upload")?;
            Ok(ShellCommand::Upload(
                rest.split_whitespace().map(PathBuf::from).collect(),
            ))
        }
        "download" => {
            let mut args = required(rest, "download")?.split_whitespace();
            let object_name = args.next().unwrap_or_default().to_string();
            Ok(ShellCommand::Download {
                object_name,
                dir: args.next().map(PathBuf::from),
            })
        }
        "rm" | "delete" => Ok(ShellCommand::Remove(required(rest, "rm")?.to_string())),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn required<'a>(rest: &'a str, command: &'static str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError::MissingArgument(command))
    } else {
        Ok(rest)
    }
}

/// Read one line from the terminal.
async fn read_line() -> Result<String> {
    let line = tokio::task::spawn_blocking(|| {
        dialoguer::Input::<String>::new()
            .with_prompt("cortex")
            .allow_empty(true)
            .interact_text()
    })
    .await??;
    Ok(line)
}

/// Run the shell until `quit` or end of input.
///
/// Returns whether the last executed command failed.
pub async fn run(controller: &Controller, download_dir: &Path) -> Result<bool> {
    println!("{}", render::listing(&controller.snapshot().await));
    println!("Type `help` for commands.");

    let mut last_failed = false;
    loop {
        let line = match read_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Input closed: {}", e);
                break;
            }
        };

        let command = match parse(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(ShellCommand::Nothing) => continue,
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e);
                last_failed = true;
                continue;
            }
        };

        last_failed = match execute(controller, command, download_dir).await {
            Ok(()) => false,
            Err(e) => {
                eprintln!("Error: {}", e.message);
                true
            }
        };
    }

    Ok(last_failed)
}

async fn execute(
    controller: &Controller,
    command: ShellCommand,
    download_dir: &Path,
) -> CommandResult<()> {
    match command {
        ShellCommand::Nothing | ShellCommand::Quit => return Ok(()),
        ShellCommand::Help => {
            println!("{}", HELP);
            return Ok(());
        }
        ShellCommand::Download { object_name, dir } => {
            let dir = dir.as_deref().unwrap_or(download_dir);
            let path = controller.download(&object_name, None, dir).await?;
            println!("Saved {}", path.display());
            return Ok(());
        }
        ShellCommand::Me => {
            let identity = controller.call_identity().await?;
            print!("{}", render::identity(&identity));
            return Ok(());
        }
        ShellCommand::List => {}
        ShellCommand::Refresh => controller.refresh().await?,
        ShellCommand::Reset => controller.reset_query().await?,
        ShellCommand::Search(text) => controller.set_search_text(text).await?,
        ShellCommand::Type(file_type) => controller.set_file_type(file_type).await?,
        ShellCommand::Sort(sort_by) => controller.set_sort_by(sort_by).await?,
        ShellCommand::Order(order) => controller.set_order(order).await?,
        ShellCommand::Upload(paths) => {
            let files = read_uploads(&paths).await?;
            let response = controller.upload(files).await?;
            for file in &response.uploaded {
                println!("Uploaded {}", file.object_name);
            }
        }
        ShellCommand::Remove(object_name) => {
            controller.delete_file(&object_name, &confirm_prompt).await?;
            println!("Deleted {}", object_name);
        }
    }

    print!("{}", render::listing(&controller.snapshot().await));
    Ok(())
}
