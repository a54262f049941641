//! State owned by the controller.

use protocol::{FileRecord, Identity, QuerySpec};
use serde::{Deserialize, Serialize};

/// The authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for backend calls.
    pub token: Option<String>,
    /// Provider user id of the signed-in user.
    pub user_id: Option<String>,
    /// Administrator flag from the last file listing.
    pub is_admin: bool,
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No user is signed in.
    SignedOut,
    /// Signed in, file list not fetched yet.
    SignedIn,
    /// Signed in and a file listing has completed.
    Ready,
}

/// Everything a front end needs to render the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    /// The authenticated session.
    pub session: Session,
    /// Active search/filter/sort parameters.
    pub query: QuerySpec,
    /// Last fetched file list. `None` until a listing completes.
    pub files: Option<Vec<FileRecord>>,
    /// A file listing is in flight.
    pub loading: bool,
    /// Result of the last identity call.
    pub identity: Option<Identity>,
    /// Visible error message.
    pub error: Option<String>,
}

impl ViewState {
    pub fn phase(&self) -> SessionPhase {
        match (&self.session.token, &self.files) {
            (None, _) => SessionPhase::SignedOut,
            (Some(_), None) => SessionPhase::SignedIn,
            (Some(_), Some(_)) => SessionPhase::Ready,
        }
    }

    /// The last fetched files, empty when unknown.
    pub fn files(&self) -> &[FileRecord] {
        self.files.as_deref().unwrap_or_default()
    }

    /// Files owned by the signed-in user.
    pub fn my_files(&self) -> Vec<&FileRecord> {
        match &self.session.user_id {
            Some(uid) => self.files().iter().filter(|f| &f.owner_id == uid).collect(),
            None => Vec::new(),
        }
    }

    /// Every fetched file, only when the session has administrator visibility.
    pub fn admin_files(&self) -> Option<&[FileRecord]> {
        self.session.is_admin.then(|| self.files())
    }

    /// Drop everything tied to the signed-in user. The query is kept.
    pub(crate) fn clear_session(&mut self) {
        self.session = Session::default();
        self.files = None;
        self.loading = false;
        self.identity = None;
        self.error = None;
    }
}
