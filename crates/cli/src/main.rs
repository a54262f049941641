//! Cortex
//!
//! Command line client for Cortex file storage.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use client::{
    AuthStateChange, Controller, CredentialStore, Credentials, FirebaseAuth, FirebaseConfig,
    SystemKeychain,
};
use cortex_cli::config::Config;
use cortex_cli::render::{self, ListingJson};
use cortex_cli::{confirm_prompt, logging, read_uploads, shell};
use protocol::{FileType, Order, QuerySpec, SortBy};

/// Cortex - browse, upload, download and delete your stored files.
#[derive(Parser, Debug)]
#[command(name = "cortex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email (defaults to [auth] email, otherwise prompted)
        #[arg(long, short)]
        email: Option<String>,
    },

    /// Sign out and forget the stored credential
    Logout,

    /// Show the identity record the backend holds for you
    Whoami,

    /// List files
    Ls {
        /// Search text
        #[arg(long, short, default_value = "")]
        search: String,

        /// File type filter (any, txt, json, pdf)
        #[arg(long = "type", short = 't', default_value = "any")]
        file_type: FileType,

        /// Sort key (date, size)
        #[arg(long, default_value = "date")]
        sort_by: SortBy,

        /// Sort order (asc, desc)
        #[arg(long, default_value = "desc")]
        order: Order,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Upload one or more files in a single request
    Upload {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Download a file
    Download {
        /// Object name as shown by `ls`
        object_name: String,

        /// Target directory (defaults to [download] dir, otherwise the working directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete a file
    Rm {
        /// Object name as shown by `ls`
        object_name: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Interactive shell
    Shell,
}

type Auth = FirebaseAuth<SystemKeychain>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    let overridden = config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let directive = logging::filter_directive(cli.verbose, &config.logging.level);
    let _log_guard = logging::init(&directive, config.logging.file.as_deref())?;

    for var in overridden {
        tracing::info!("Using {} from environment", var);
    }
    tracing::debug!("Backend: {}", config.backend.url);

    let api_key = config.api_key()?.to_string();
    let auth = Arc::new(FirebaseAuth::new(
        FirebaseConfig::new(api_key),
        CredentialStore::system(),
    ));
    let api = Arc::new(config.client().file_api());
    let controller = Controller::new(api, auth.clone());

    match cli.command {
        Commands::Login { email } => {
            let email = match email.or_else(|| config.auth.email.clone()) {
                Some(email) => email,
                None => dialoguer::Input::<String>::new()
                    .with_prompt("Email")
                    .interact_text()?,
            };
            let password = dialoguer::Password::new()
                .with_prompt("Password")
                .interact()?;

            let user = controller
                .sign_in(&Credentials::new(email, password))
                .await?;
            println!(
                "Signed in as {} ({})",
                user.email.as_deref().unwrap_or("-"),
                user.uid
            );
        }
        Commands::Logout => {
            controller.sign_out().await?;
            println!("Signed out.");
        }
        Commands::Whoami => {
            resume_session(&controller, &auth).await?;
            let identity = controller.call_identity().await?;
            print!("{}", render::identity(&identity));
        }
        Commands::Ls {
            search,
            file_type,
            sort_by,
            order,
            json,
        } => {
            // Set the query first so the session's initial listing uses it.
            controller
                .set_query(QuerySpec {
                    text: search,
                    file_type,
                    sort_by,
                    order,
                })
                .await?;
            resume_session(&controller, &auth).await?;

            let state = controller.snapshot().await;
            if let Some(error) = &state.error {
                anyhow::bail!("{}", error);
            }

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ListingJson::from_state(&state))?
                );
            } else {
                print!("{}", render::listing(&state));
            }
        }
        Commands::Upload { paths } => {
            resume_session(&controller, &auth).await?;
            let files = read_uploads(&paths).await?;
            let response = controller.upload(files).await?;
            for file in &response.uploaded {
                println!("Uploaded {}", file.object_name);
            }
        }
        Commands::Download {
            object_name,
            output,
        } => {
            resume_session(&controller, &auth).await?;
            let dir = output.unwrap_or_else(|| config.download_dir());
            let path = controller.download(&object_name, None, &dir).await?;
            println!("Saved {}", path.display());
        }
        Commands::Rm { object_name, yes } => {
            resume_session(&controller, &auth).await?;
            let response = if yes {
                controller
                    .delete_file(&object_name, &|_: &str| true)
                    .await?
            } else {
                controller.delete_file(&object_name, &confirm_prompt).await?
            };
            println!(
                "Deleted {}",
                response.object_name.as_deref().unwrap_or(&object_name)
            );
        }
        Commands::Shell => {
            resume_session(&controller, &auth).await?;
            let failed = shell::run(&controller, &config.download_dir()).await?;
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Restore the persisted session and start it on the controller.
///
/// A failing initial listing is recorded in the controller state and left to
/// the caller.
async fn resume_session(controller: &Controller, auth: &Auth) -> anyhow::Result<()> {
    let user = auth
        .restore()
        .await
        .context("Failed to restore session")?
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `cortex login` first."))?;

    tracing::debug!("Resumed session for {}", user.uid);
    if let Err(e) = controller
        .handle_auth_change(AuthStateChange::SignedIn(user))
        .await
    {
        tracing::debug!("Initial listing failed: {}", e);
    }
    Ok(())
}
