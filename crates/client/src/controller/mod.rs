//! Session & query controller.
//!
//! The controller owns the client's [`ViewState`] and keeps it in sync with
//! two sources of change:
//!
//! - auth-state transitions from the [`IdentityProvider`]
//! - mutations of the active [`QuerySpec`]
//!
//! Each of these re-issues the authenticated file listing. Upload, download,
//! delete and identity calls are request/response operations gated by the
//! same session.
//!
//! Every operation clears the visible error on entry and, on failure, stores
//! the message in [`ViewState::error`] before returning it as a
//! [`CommandError`].
//!
//! File listings carry a generation number. Only the response of the most
//! recently issued listing is applied; a later query or a sign-out discards
//! whatever is still in flight.
//!
//! Operations also capture the session epoch when they start. Sign-out and a
//! change of user advance it, after which a pending operation no longer
//! writes a token, issues its follow-up listing or stores its result.

pub mod state;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use protocol::{
    display_name, DeleteResponse, FileType, Identity, Order, QuerySpec, SortBy, UploadFile,
    UploadResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::api::{ApiError, FileApi};
use crate::auth::{AuthError, AuthStateChange, AuthUser, Credentials, IdentityProvider};

pub use state::{Session, SessionPhase, ViewState};

/// Buffer size for the controller event channel.
const EVENT_BUFFER_SIZE: usize = 64;

/// Prompt shown before deleting a file.
pub const DELETE_PROMPT: &str = "Delete this file?";

// ============================================================================
// Error Types
// ============================================================================

/// Unified error type for controller operations.
///
/// Serializable so it can be handed to any front end as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl CommandError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn not_authenticated() -> Self {
        Self::new("NOT_AUTHENTICATED", "Not logged in")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new("CANCELLED", message)
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<ApiError> for CommandError {
    fn from(e: ApiError) -> Self {
        let code = match &e {
            ApiError::Http { .. } => "HTTP_ERROR",
            ApiError::Transport(_) => "TRANSPORT_ERROR",
            ApiError::Decode(_) => "DECODE_ERROR",
            ApiError::Protocol(_) => "INVALID_REQUEST",
        };
        Self::new(code, e.to_string())
    }
}

impl From<AuthError> for CommandError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotSignedIn => Self::not_authenticated(),
            AuthError::Transport(msg) => Self::new("TRANSPORT_ERROR", msg),
            other => Self::new("AUTH_ERROR", other.to_string()),
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self::new("IO_ERROR", e.to_string())
    }
}

/// Result type for controller operations.
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Events
// ============================================================================

/// Notifications emitted as the controller's state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControllerEvent {
    /// Lifecycle phase changed.
    PhaseChanged(SessionPhase),
    /// The active query changed.
    QueryChanged(QuerySpec),
    /// A file listing was applied.
    FilesUpdated {
        total: usize,
        mine: usize,
        admin: bool,
    },
    /// The loading indicator toggled.
    LoadingChanged(bool),
    /// An operation failed.
    Error(String),
}

/// Interactive confirmation used before destructive operations.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Session & query controller.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Controller {
    api: Arc<dyn FileApi>,
    identity: Arc<dyn IdentityProvider>,
    state: Arc<RwLock<ViewState>>,
    fetch_generation: Arc<AtomicU64>,
    session_epoch: Arc<AtomicU64>,
    event_tx: broadcast::Sender<ControllerEvent>,
}

impl Controller {
    /// Create a signed-out controller over the given collaborators.
    pub fn new(api: Arc<dyn FileApi>, identity: Arc<dyn IdentityProvider>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            api,
            identity,
            state: Arc::new(RwLock::new(ViewState::default())),
            fetch_generation: Arc::new(AtomicU64::new(0)),
            session_epoch: Arc::new(AtomicU64::new(0)),
            event_tx,
        }
    }

    /// Subscribes to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.event_tx.send(event);
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> ViewState {
        self.state.read().await.clone()
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase()
    }

    /// Current query parameters.
    pub async fn query(&self) -> QuerySpec {
        self.state.read().await.query.clone()
    }

    fn epoch(&self) -> u64 {
        self.session_epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Record a failure as the visible error and hand it back.
    async fn fail<T>(&self, error: impl Into<CommandError>) -> CommandResult<T> {
        let error = error.into();
        tracing::warn!("{}", error);
        self.state.write().await.error = Some(error.message.clone());
        self.emit(ControllerEvent::Error(error.message.clone()));
        Err(error)
    }

    /// A bearer token for a state-changing or identity call.
    ///
    /// The refreshed token is stored only while the session that started the
    /// call is still active.
    async fn fresh_token(&self, epoch: u64) -> CommandResult<String> {
        let token = match self.identity.id_token(true).await {
            Ok(token) => token,
            Err(e) => return self.fail(e).await,
        };

        let mut state = self.state.write().await;
        if !self.is_current(epoch) || state.session.user_id.is_none() {
            drop(state);
            tracing::debug!("Session ended while refreshing the token");
            return self.fail(CommandError::not_authenticated()).await;
        }
        state.session.token = Some(token.clone());
        Ok(token)
    }

    // ------------------------------------------------------------------------
    // Auth state
    // ------------------------------------------------------------------------

    /// Apply an auth-state transition.
    pub async fn handle_auth_change(&self, change: AuthStateChange) -> CommandResult<()> {
        match change {
            AuthStateChange::SignedIn(user) => self.on_signed_in(user).await,
            AuthStateChange::SignedOut => {
                self.clear_session().await;
                Ok(())
            }
        }
    }

    /// Apply whatever the provider currently reports.
    pub async fn sync_with_provider(&self) -> CommandResult<()> {
        let change = match self.identity.current_user().await {
            Some(user) => AuthStateChange::SignedIn(user),
            None => AuthStateChange::SignedOut,
        };
        self.handle_auth_change(change).await
    }

    async fn on_signed_in(&self, user: AuthUser) -> CommandResult<()> {
        self.clear_error().await;
        let started = self.epoch();

        let token = match self.identity.id_token(false).await {
            Ok(token) => token,
            Err(e) => return self.fail(e).await,
        };

        let (query, epoch) = {
            let mut state = self.state.write().await;
            if !self.is_current(started) {
                tracing::debug!("Sign-in for {} superseded", user.uid);
                return Ok(());
            }
            let same_user = state.session.user_id.as_deref() == Some(user.uid.as_str());
            state.session.token = Some(token.clone());
            state.session.user_id = Some(user.uid.clone());
            if !same_user {
                self.session_epoch.fetch_add(1, Ordering::SeqCst);
                state.session.is_admin = false;
                state.files = None;
                state.identity = None;
            }
            (state.query.clone(), self.epoch())
        };

        tracing::info!("Session started for {}", user.uid);
        self.emit(ControllerEvent::PhaseChanged(self.phase().await));
        self.fetch_with(&token, query, epoch).await
    }

    async fn clear_session(&self) {
        {
            let mut state = self.state.write().await;
            // Supersede any listing or operation still in flight.
            self.fetch_generation.fetch_add(1, Ordering::SeqCst);
            self.session_epoch.fetch_add(1, Ordering::SeqCst);
            state.clear_session();
        }
        tracing::info!("Session cleared");
        self.emit(ControllerEvent::PhaseChanged(SessionPhase::SignedOut));
    }

    /// Spawn a task that applies every transition the provider broadcasts.
    pub fn spawn_auth_listener(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let mut events = self.identity.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => {
                        // Failures are already recorded in the view state.
                        let _ = controller.handle_auth_change(change).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Auth listener lagged by {} events, resyncing", skipped);
                        let _ = controller.sync_with_provider().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth listener stopped");
        })
    }

    /// Sign in with the provider.
    ///
    /// The session itself starts when the resulting
    /// [`AuthStateChange::SignedIn`] is applied, either by
    /// [`Controller::spawn_auth_listener`] or by [`Controller::handle_auth_change`].
    pub async fn sign_in(&self, credentials: &Credentials) -> CommandResult<AuthUser> {
        self.clear_error().await;
        match self.identity.sign_in(credentials).await {
            Ok(user) => Ok(user),
            Err(e) => self.fail(e).await,
        }
    }

    /// Sign out with the provider and clear all session state.
    pub async fn sign_out(&self) -> CommandResult<()> {
        let result = self.identity.sign_out().await;
        self.clear_session().await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e).await,
        }
    }

    // ------------------------------------------------------------------------
    // File listing
    // ------------------------------------------------------------------------

    /// Re-fetch the file list with the current query.
    pub async fn refresh(&self) -> CommandResult<()> {
        let (token, query, epoch) = {
            let state = self.state.read().await;
            (state.session.token.clone(), state.query.clone(), self.epoch())
        };

        match token {
            Some(token) => self.fetch_with(&token, query, epoch).await,
            None => {
                self.clear_error().await;
                self.fail(CommandError::not_authenticated()).await
            }
        }
    }

    /// Fetch the file list and apply the response if it is still current.
    ///
    /// Nothing is sent once the session of `epoch` has ended.
    async fn fetch_with(&self, token: &str, query: QuerySpec, epoch: u64) -> CommandResult<()> {
        let generation = {
            let mut state = self.state.write().await;
            if !self.is_current(epoch) {
                tracing::debug!("Session ended, skipping file listing ({})", query);
                return Ok(());
            }
            state.loading = true;
            state.error = None;
            self.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.emit(ControllerEvent::LoadingChanged(true));

        let result = self.api.list_files(token, &query).await;

        let mut state = self.state.write().await;
        if self.fetch_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Discarding superseded file listing ({})", query);
            return Ok(());
        }
        state.loading = false;

        match result {
            Ok(response) => {
                let was_ready = state.files.is_some();
                state.session.is_admin = response.admin;
                state.files = Some(response.files);

                let total = state.files().len();
                let mine = state.my_files().len();
                drop(state);

                tracing::debug!("Listed {} files ({} mine, admin: {})", total, mine, response.admin);
                self.emit(ControllerEvent::LoadingChanged(false));
                self.emit(ControllerEvent::FilesUpdated {
                    total,
                    mine,
                    admin: response.admin,
                });
                if !was_ready {
                    self.emit(ControllerEvent::PhaseChanged(SessionPhase::Ready));
                }
                Ok(())
            }
            Err(e) => {
                if matches!(e, ApiError::Http { .. }) {
                    state.files = Some(Vec::new());
                    state.session.is_admin = false;
                }
                drop(state);

                self.emit(ControllerEvent::LoadingChanged(false));
                self.fail(e).await
            }
        }
    }

    // ------------------------------------------------------------------------
    // Query mutation
    // ------------------------------------------------------------------------

    /// Apply a query mutation and re-fetch when signed in.
    ///
    /// A mutation that leaves the query unchanged does nothing.
    pub async fn update_query<F>(&self, mutate: F) -> CommandResult<()>
    where
        F: FnOnce(&mut QuerySpec),
    {
        let (token, query, epoch) = {
            let mut state = self.state.write().await;
            let before = state.query.clone();
            mutate(&mut state.query);
            if state.query == before {
                return Ok(());
            }
            (state.session.token.clone(), state.query.clone(), self.epoch())
        };

        tracing::debug!("Query changed: {}", query);
        self.emit(ControllerEvent::QueryChanged(query.clone()));

        match token {
            Some(token) => self.fetch_with(&token, query, epoch).await,
            None => Ok(()),
        }
    }

    pub async fn set_search_text(&self, text: impl Into<String>) -> CommandResult<()> {
        let text = text.into();
        self.update_query(|q| q.text = text).await
    }

    pub async fn set_file_type(&self, file_type: FileType) -> CommandResult<()> {
        self.update_query(|q| q.file_type = file_type).await
    }

    pub async fn set_sort_by(&self, sort_by: SortBy) -> CommandResult<()> {
        self.update_query(|q| q.sort_by = sort_by).await
    }

    pub async fn set_order(&self, order: Order) -> CommandResult<()> {
        self.update_query(|q| q.order = order).await
    }

    pub async fn set_query(&self, query: QuerySpec) -> CommandResult<()> {
        self.update_query(|q| *q = query).await
    }

    /// Restore the default query.
    pub async fn reset_query(&self) -> CommandResult<()> {
        self.update_query(|q| *q = QuerySpec::default()).await
    }

    // ------------------------------------------------------------------------
    // File operations
    // ------------------------------------------------------------------------

    /// Upload every file in one request, then re-fetch.
    ///
    /// On failure the current file list is left as it was.
    pub async fn upload(&self, files: Vec<UploadFile>) -> CommandResult<UploadResponse> {
        self.clear_error().await;

        if files.is_empty() {
            return self.fail(CommandError::cancelled("No files selected")).await;
        }

        let epoch = self.epoch();
        let token = self.fresh_token(epoch).await?;
        let response = match self.api.upload(&token, files).await {
            Ok(response) => response,
            Err(e) => return self.fail(e).await,
        };

        tracing::info!("Uploaded {} files", response.uploaded.len());
        let query = self.query().await;
        if let Err(e) = self.fetch_with(&token, query, epoch).await {
            tracing::debug!("Listing after upload failed: {}", e);
        }
        Ok(response)
    }

    /// Download an object into `dest_dir`.
    ///
    /// The file is named `suggested_filename`, or the object's display name
    /// when none is given. Returns the written path.
    pub async fn download(
        &self,
        object_name: &str,
        suggested_filename: Option<&str>,
        dest_dir: &Path,
    ) -> CommandResult<PathBuf> {
        self.clear_error().await;

        let token = self.fresh_token(self.epoch()).await?;
        let link = match self.api.download_url(&token, object_name).await {
            Ok(link) => link,
            Err(e) => return self.fail(e).await,
        };

        let content = match self.api.fetch_signed(&link.url).await {
            Ok(content) => content,
            Err(e) => return self.fail(e).await,
        };

        let filename = local_filename(object_name, suggested_filename);
        let path = dest_dir.join(filename);
        if let Err(e) = tokio::fs::write(&path, &content).await {
            return self.fail(e).await;
        }

        tracing::info!("Downloaded {} to {}", object_name, path.display());
        Ok(path)
    }

    /// Delete an object after confirmation, then re-fetch.
    pub async fn delete_file(
        &self,
        object_name: &str,
        confirm: &dyn Confirm,
    ) -> CommandResult<DeleteResponse> {
        self.clear_error().await;

        if !confirm.confirm(DELETE_PROMPT) {
            return self.fail(CommandError::cancelled("Delete cancelled")).await;
        }

        let epoch = self.epoch();
        let token = self.fresh_token(epoch).await?;
        let response = match self.api.delete(&token, object_name).await {
            Ok(response) => response,
            Err(e) => return self.fail(e).await,
        };

        tracing::info!("Deleted {}", object_name);
        let query = self.query().await;
        if let Err(e) = self.fetch_with(&token, query, epoch).await {
            tracing::debug!("Listing after delete failed: {}", e);
        }
        Ok(response)
    }

    /// Fetch the caller's identity record.
    pub async fn call_identity(&self) -> CommandResult<Identity> {
        let epoch = {
            let mut state = self.state.write().await;
            state.error = None;
            state.identity = None;
            self.epoch()
        };

        let token = self.fresh_token(epoch).await?;
        match self.api.me(&token).await {
            Ok(identity) => {
                let mut state = self.state.write().await;
                if self.is_current(epoch) {
                    state.identity = Some(identity.clone());
                }
                Ok(identity)
            }
            Err(e) => self.fail(e).await,
        }
    }
}

/// Local filename for a download: the suggestion or the object's display
/// name, reduced to its final path component.
fn local_filename(object_name: &str, suggested: Option<&str>) -> String {
    let candidate = suggested
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let last = object_name.rsplit('/').next().unwrap_or(object_name);
            display_name(last).to_string()
        });

    Path::new(&candidate)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests;
