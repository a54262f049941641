use super::*;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use protocol::{DownloadUrlResponse, FileListResponse, FileRecord, UploadedFile};
use tokio::sync::{oneshot, Notify};

use crate::api::ApiResult;
use crate::auth::AuthResult;

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct MockFileApi {
    files: Mutex<Vec<FileRecord>>,
    admin: Mutex<bool>,
    list_calls: Mutex<Vec<(String, QuerySpec)>>,
    list_errors: Mutex<VecDeque<ApiError>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    entered: Notify,
    upload_gate: Mutex<Option<oneshot::Receiver<()>>>,
    upload_calls: Mutex<Vec<(String, Vec<UploadFile>)>>,
    upload_error: Mutex<Option<ApiError>>,
    delete_calls: Mutex<Vec<(String, String)>>,
    blobs: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockFileApi {
    fn set_files(&self, files: Vec<FileRecord>, admin: bool) {
        *self.files.lock().unwrap() = files;
        *self.admin.lock().unwrap() = admin;
    }

    /// Hold the next listing until the returned sender fires.
    fn hold_next_listing(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Hold the next upload until the returned sender fires.
    fn hold_next_upload(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.upload_gate.lock().unwrap() = Some(rx);
        tx
    }

    fn list_count(&self) -> usize {
        self.list_calls.lock().unwrap().len()
    }

    fn last_query(&self) -> QuerySpec {
        self.list_calls.lock().unwrap().last().unwrap().1.clone()
    }
}

#[async_trait]
impl FileApi for MockFileApi {
    async fn list_files(&self, token: &str, query: &QuerySpec) -> ApiResult<FileListResponse> {
        self.list_calls
            .lock()
            .unwrap()
            .push((token.to_string(), query.clone()));

        // Snapshot the answer before a held listing waits.
        let response = FileListResponse {
            admin: *self.admin.lock().unwrap(),
            files: self.files.lock().unwrap().clone(),
        };
        let error = self.list_errors.lock().unwrap().pop_front();

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _ = gate.await;
        }

        match error {
            Some(e) => Err(e),
            None => Ok(response),
        }
    }

    async fn me(&self, token: &str) -> ApiResult<Identity> {
        Ok(Identity {
            uid: "alice".to_string(),
            email: Some(format!("alice@example.com ({})", token)),
            is_admin: *self.admin.lock().unwrap(),
        })
    }

    async fn upload(&self, token: &str, files: Vec<UploadFile>) -> ApiResult<UploadResponse> {
        let gate = self.upload_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _ = gate.await;
        }

        if let Some(e) = self.upload_error.lock().unwrap().take() {
            return Err(e);
        }
        let uploaded = files
            .iter()
            .map(|f| UploadedFile {
                object_name: format!("alice/x_{}", f.filename),
                filename: format!("x_{}", f.filename),
                size: Some(f.content.len() as u64),
                content_type: Some(f.mime_type.clone()),
                updated_at: None,
            })
            .collect();
        self.upload_calls
            .lock()
            .unwrap()
            .push((token.to_string(), files));
        Ok(UploadResponse { uploaded })
    }

    async fn download_url(
        &self,
        _token: &str,
        object_name: &str,
    ) -> ApiResult<DownloadUrlResponse> {
        Ok(DownloadUrlResponse {
            url: format!("https://signed.example.com/{}", object_name),
        })
    }

    async fn delete(&self, token: &str, object_name: &str) -> ApiResult<DeleteResponse> {
        self.delete_calls
            .lock()
            .unwrap()
            .push((token.to_string(), object_name.to_string()));
        Ok(DeleteResponse {
            deleted: true,
            object_name: Some(object_name.to_string()),
        })
    }

    async fn fetch_signed(&self, url: &str) -> ApiResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, content)| content.clone())
            .ok_or(ApiError::Http {
                status: 404,
                body: "HTTP 404".to_string(),
            })
    }
}

struct MockIdentity {
    user: Mutex<Option<AuthUser>>,
    refreshes: Mutex<u32>,
    token_gate: Mutex<Option<oneshot::Receiver<()>>>,
    token_entered: Notify,
    event_tx: broadcast::Sender<AuthStateChange>,
}

impl MockIdentity {
    fn new() -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            user: Mutex::new(None),
            refreshes: Mutex::new(0),
            token_gate: Mutex::new(None),
            token_entered: Notify::new(),
            event_tx,
        }
    }

    /// Hold the next token request until the returned sender fires.
    fn hold_next_token(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.token_gate.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        if credentials.password != "secret" {
            return Err(AuthError::Rejected("INVALID_PASSWORD".to_string()));
        }
        let user = AuthUser {
            uid: "alice".to_string(),
            email: Some(credentials.email.clone()),
        };
        *self.user.lock().unwrap() = Some(user.clone());
        let _ = self.event_tx.send(AuthStateChange::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        *self.user.lock().unwrap() = None;
        let _ = self.event_tx.send(AuthStateChange::SignedOut);
        Ok(())
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.user.lock().unwrap().clone()
    }

    async fn id_token(&self, force_refresh: bool) -> AuthResult<String> {
        if self.user.lock().unwrap().is_none() {
            return Err(AuthError::NotSignedIn);
        }

        let gate = self.token_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.token_entered.notify_one();
            let _ = gate.await;
        }

        let mut refreshes = self.refreshes.lock().unwrap();
        if force_refresh {
            *refreshes += 1;
        }
        Ok(format!("token-{}", *refreshes))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.event_tx.subscribe()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn record(name: &str, owner: &str) -> FileRecord {
    FileRecord {
        object_name: format!("{}/{}", owner, name),
        filename: name.to_string(),
        owner_id: owner.to_string(),
        size: Some(10),
        timestamp: "2024-05-01T10:00:00Z".parse().ok(),
        content_type: Some("text/plain".to_string()),
        ext: Some("txt".to_string()),
        bucket: None,
    }
}

fn alice() -> AuthUser {
    AuthUser {
        uid: "alice".to_string(),
        email: Some("alice@example.com".to_string()),
    }
}

fn setup() -> (Controller, Arc<MockFileApi>, Arc<MockIdentity>) {
    let api = Arc::new(MockFileApi::default());
    let identity = Arc::new(MockIdentity::new());
    let controller = Controller::new(api.clone(), identity.clone());
    (controller, api, identity)
}

/// A controller signed in as alice with one listing applied.
async fn signed_in() -> (Controller, Arc<MockFileApi>, Arc<MockIdentity>) {
    let (controller, api, identity) = setup();
    api.set_files(vec![record("a.txt", "alice"), record("b.txt", "bob")], false);
    identity
        .sign_in(&Credentials::new("alice@example.com", "secret"))
        .await
        .expect("Failed to sign in");
    controller
        .handle_auth_change(AuthStateChange::SignedIn(alice()))
        .await
        .expect("Failed to start session");
    (controller, api, identity)
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_sign_in_fetches_with_default_query() {
    let (controller, api, _identity) = signed_in().await;

    assert_eq!(api.list_count(), 1);
    let (token, query) = api.list_calls.lock().unwrap()[0].clone();
    assert_eq!(token, "token-0");
    assert_eq!(query, QuerySpec::default());

    let state = controller.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::Ready);
    assert_eq!(state.session.user_id.as_deref(), Some("alice"));
    assert!(!state.loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_my_files_and_admin_visibility() {
    let (controller, api, _identity) = signed_in().await;

    let state = controller.snapshot().await;
    assert_eq!(state.my_files().len(), 1);
    assert!(state.admin_files().is_none());

    api.set_files(vec![record("a.txt", "alice"), record("b.txt", "bob")], true);
    controller.refresh().await.expect("Failed to refresh");

    let state = controller.snapshot().await;
    assert!(state.session.is_admin);
    assert_eq!(state.my_files().len(), 1);
    assert_eq!(state.admin_files().map(|f| f.len()), Some(2));
}

#[tokio::test]
async fn test_sign_out_clears_session_and_keeps_query() {
    let (controller, api, _identity) = signed_in().await;
    controller
        .set_search_text("report")
        .await
        .expect("Failed to set search");
    controller.call_identity().await.expect("Failed to call /me");

    api.list_errors
        .lock()
        .unwrap()
        .push_back(ApiError::Transport("connection reset".to_string()));
    controller.refresh().await.unwrap_err();
    assert_eq!(
        controller.snapshot().await.error.as_deref(),
        Some("connection reset")
    );

    controller.sign_out().await.expect("Failed to sign out");

    let state = controller.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::SignedOut);
    assert_eq!(state.session, Session::default());
    assert!(state.files.is_none());
    assert!(state.identity.is_none());
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(state.query.text, "report");
}

#[tokio::test]
async fn test_rejected_sign_in_sets_error() {
    let (controller, _api, _identity) = setup();

    let err = controller
        .sign_in(&Credentials::new("alice@example.com", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.code, "AUTH_ERROR");
    let state = controller.snapshot().await;
    assert_eq!(state.error, Some(err.message));
    assert_eq!(state.phase(), SessionPhase::SignedOut);
}

#[tokio::test]
async fn test_auth_listener_applies_sign_in() {
    let (controller, _api, _identity) = setup();
    let mut events = controller.subscribe();
    let listener = controller.spawn_auth_listener();

    controller
        .sign_in(&Credentials::new("alice@example.com", "secret"))
        .await
        .expect("Failed to sign in");

    let ready = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(ControllerEvent::PhaseChanged(SessionPhase::Ready)) = events.recv().await {
                break;
            }
        }
    })
    .await;
    assert!(ready.is_ok(), "controller never became ready");
    assert_eq!(controller.phase().await, SessionPhase::Ready);

    listener.abort();
}

// ============================================================================
// Query
// ============================================================================

#[tokio::test]
async fn test_query_mutation_refetches() {
    let (controller, api, _identity) = signed_in().await;

    controller
        .set_file_type(FileType::Pdf)
        .await
        .expect("Failed to set type");
    controller
        .set_sort_by(SortBy::Size)
        .await
        .expect("Failed to set sort");
    controller
        .set_order(Order::Asc)
        .await
        .expect("Failed to set order");

    assert_eq!(api.list_count(), 4);
    let query = api.last_query();
    assert_eq!(query.file_type, FileType::Pdf);
    assert_eq!(query.sort_by, SortBy::Size);
    assert_eq!(query.order, Order::Asc);

    controller.reset_query().await.expect("Failed to reset");
    assert_eq!(api.list_count(), 5);
    assert_eq!(api.last_query(), QuerySpec::default());
}

#[tokio::test]
async fn test_unchanged_query_does_not_refetch() {
    let (controller, api, _identity) = signed_in().await;

    controller
        .set_order(Order::Desc)
        .await
        .expect("Failed to set order");
    controller.reset_query().await.expect("Failed to reset");

    assert_eq!(api.list_count(), 1);
}

#[tokio::test]
async fn test_query_mutation_without_session_only_updates_query() {
    let (controller, api, _identity) = setup();

    controller
        .set_search_text("invoice")
        .await
        .expect("Failed to set search");

    assert_eq!(api.list_count(), 0);
    assert_eq!(controller.query().await.text, "invoice");
}

#[tokio::test]
async fn test_refresh_without_session() {
    let (controller, api, _identity) = setup();

    let err = controller.refresh().await.unwrap_err();

    assert_eq!(err.code, "NOT_AUTHENTICATED");
    assert_eq!(err.message, "Not logged in");
    assert_eq!(controller.snapshot().await.error.as_deref(), Some("Not logged in"));
    assert_eq!(api.list_count(), 0);
}

#[tokio::test]
async fn test_superseded_listing_is_discarded() {
    let (controller, api, _identity) = signed_in().await;

    let release = api.hold_next_listing();
    let old = controller.clone();
    let pending = tokio::spawn(async move { old.set_search_text("old").await });
    api.entered.notified().await;

    let newest = vec![record("new.txt", "alice")];
    api.set_files(newest.clone(), false);
    controller
        .set_search_text("new")
        .await
        .expect("Failed to set search");

    release.send(()).expect("Failed to release listing");
    pending
        .await
        .expect("Listing task panicked")
        .expect("Superseded listing should not fail");

    let state = controller.snapshot().await;
    assert_eq!(state.query.text, "new");
    assert_eq!(state.files, Some(newest));
    assert!(!state.loading);
}

#[tokio::test]
async fn test_listing_in_flight_at_sign_out_is_discarded() {
    let (controller, api, identity) = signed_in().await;

    let release = api.hold_next_listing();
    let pending_controller = controller.clone();
    let pending = tokio::spawn(async move { pending_controller.refresh().await });
    api.entered.notified().await;

    identity.sign_out().await.expect("Failed to sign out");
    controller
        .handle_auth_change(AuthStateChange::SignedOut)
        .await
        .expect("Failed to clear session");

    release.send(()).expect("Failed to release listing");
    pending
        .await
        .expect("Listing task panicked")
        .expect("Superseded listing should not fail");

    let state = controller.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::SignedOut);
    assert!(state.files.is_none());
    assert!(!state.session.is_admin);
}

#[tokio::test]
async fn test_http_error_clears_listing() {
    let (controller, api, _identity) = signed_in().await;
    api.set_files(vec![record("a.txt", "alice")], true);
    controller.refresh().await.expect("Failed to refresh");

    api.list_errors.lock().unwrap().push_back(ApiError::Http {
        status: 500,
        body: "{\n  \"detail\": \"boom\"\n}".to_string(),
    });
    let err = controller.refresh().await.unwrap_err();

    assert_eq!(err.code, "HTTP_ERROR");
    let state = controller.snapshot().await;
    assert_eq!(state.files, Some(Vec::new()));
    assert!(!state.session.is_admin);
    assert_eq!(state.error.as_deref(), Some("{\n  \"detail\": \"boom\"\n}"));
    assert!(!state.loading);
}

#[tokio::test]
async fn test_transport_error_keeps_listing() {
    let (controller, api, _identity) = signed_in().await;

    api.list_errors
        .lock()
        .unwrap()
        .push_back(ApiError::Transport("connection refused".to_string()));
    let err = controller.refresh().await.unwrap_err();

    assert_eq!(err.code, "TRANSPORT_ERROR");
    let state = controller.snapshot().await;
    assert_eq!(state.files().len(), 2);
    assert_eq!(state.error.as_deref(), Some("connection refused"));
}

// ============================================================================
// File operations
// ============================================================================

#[tokio::test]
async fn test_upload_without_files_is_cancelled() {
    let (controller, api, _identity) = signed_in().await;

    let err = controller.upload(Vec::new()).await.unwrap_err();

    assert_eq!(err.code, "CANCELLED");
    assert_eq!(err.message, "No files selected");
    assert!(api.upload_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_sends_batch_and_refetches() {
    let (controller, api, _identity) = signed_in().await;

    let files = vec![
        UploadFile::new("one.txt", b"1".to_vec()),
        UploadFile::new("two.pdf", b"2".to_vec()),
    ];
    let response = controller.upload(files).await.expect("Failed to upload");

    assert_eq!(response.uploaded.len(), 2);
    let calls = api.upload_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "token-1");
    assert_eq!(calls[0].1.len(), 2);
    assert_eq!(api.list_count(), 2);

    let state = controller.snapshot().await;
    assert_eq!(state.session.token.as_deref(), Some("token-1"));
}

#[tokio::test]
async fn test_failed_upload_keeps_listing() {
    let (controller, api, _identity) = signed_in().await;
    let before = controller.snapshot().await.files;

    *api.upload_error.lock().unwrap() = Some(ApiError::Http {
        status: 413,
        body: "too large".to_string(),
    });
    let err = controller
        .upload(vec![UploadFile::new("big.json", vec![0; 16])])
        .await
        .unwrap_err();

    assert_eq!(err.message, "too large");
    let state = controller.snapshot().await;
    assert_eq!(state.files, before);
    assert_eq!(state.error.as_deref(), Some("too large"));
    assert_eq!(api.list_count(), 1);
}

#[tokio::test]
async fn test_upload_when_signed_out() {
    let (controller, _api, _identity) = setup();

    let err = controller
        .upload(vec![UploadFile::new("a.txt", Vec::new())])
        .await
        .unwrap_err();

    assert_eq!(err.code, "NOT_AUTHENTICATED");
}

#[tokio::test]
async fn test_sign_out_during_upload_skips_follow_up_listing() {
    let (controller, api, _identity) = signed_in().await;
    api.set_files(vec![record("a.txt", "alice"), record("b.txt", "bob")], true);

    let release = api.hold_next_upload();
    let pending_controller = controller.clone();
    let pending = tokio::spawn(async move {
        pending_controller
            .upload(vec![UploadFile::new("one.txt", b"1".to_vec())])
            .await
    });
    api.entered.notified().await;

    controller.sign_out().await.expect("Failed to sign out");
    release.send(()).expect("Failed to release upload");
    let response = pending
        .await
        .expect("Upload task panicked")
        .expect("Upload itself succeeded");

    assert_eq!(response.uploaded.len(), 1);
    assert_eq!(api.list_count(), 1);
    let state = controller.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::SignedOut);
    assert_eq!(state.session, Session::default());
    assert!(state.files.is_none());
    assert!(state.admin_files().is_none());
}

#[tokio::test]
async fn test_sign_out_during_delete_skips_follow_up_listing() {
    let (controller, api, identity) = signed_in().await;
    api.set_files(vec![record("a.txt", "alice"), record("b.txt", "bob")], true);

    let release = identity.hold_next_token();
    let pending_controller = controller.clone();
    let pending = tokio::spawn(async move {
        pending_controller
            .delete_file("alice/a.txt", &|_: &str| true)
            .await
    });
    identity.token_entered.notified().await;

    controller.sign_out().await.expect("Failed to sign out");
    release.send(()).expect("Failed to release token");
    let err = pending
        .await
        .expect("Delete task panicked")
        .unwrap_err();

    assert_eq!(err.code, "NOT_AUTHENTICATED");
    assert!(api.delete_calls.lock().unwrap().is_empty());
    assert_eq!(api.list_count(), 1);
    let state = controller.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::SignedOut);
    assert!(state.session.token.is_none());
    assert!(!state.session.is_admin);
}

#[tokio::test]
async fn test_declined_delete_is_cancelled() {
    let (controller, api, _identity) = signed_in().await;

    let err = controller
        .delete_file("alice/a.txt", &|_: &str| false)
        .await
        .unwrap_err();

    assert_eq!(err.code, "CANCELLED");
    assert!(api.delete_calls.lock().unwrap().is_empty());
    assert_eq!(api.list_count(), 1);
}

#[tokio::test]
async fn test_confirmed_delete_refetches() {
    let (controller, api, _identity) = signed_in().await;

    let prompt = Mutex::new(String::new());
    let confirm = |text: &str| {
        *prompt.lock().unwrap() = text.to_string();
        true
    };
    let response = controller
        .delete_file("alice/a.txt", &confirm)
        .await
        .expect("Failed to delete");

    assert!(response.deleted);
    assert_eq!(prompt.lock().unwrap().as_str(), DELETE_PROMPT);
    assert_eq!(
        api.delete_calls.lock().unwrap()[0],
        ("token-1".to_string(), "alice/a.txt".to_string())
    );
    assert_eq!(api.list_count(), 2);
}

#[tokio::test]
async fn test_download_writes_display_name() {
    let (controller, api, _identity) = signed_in().await;
    api.blobs.lock().unwrap().push((
        "https://signed.example.com/alice/1f2e_report.txt".to_string(),
        b"hello".to_vec(),
    ));
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let path = controller
        .download("alice/1f2e_report.txt", None, dir.path())
        .await
        .expect("Failed to download");

    assert_eq!(path, dir.path().join("report.txt"));
    let content = std::fs::read(&path).expect("Failed to read download");
    assert_eq!(content, b"hello");
}

#[tokio::test]
async fn test_download_failure_sets_error() {
    let (controller, _api, _identity) = signed_in().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let err = controller
        .download("alice/missing.txt", Some("missing.txt"), dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.code, "HTTP_ERROR");
    assert!(!dir.path().join("missing.txt").exists());
    assert!(controller.snapshot().await.error.is_some());
}

#[tokio::test]
async fn test_call_identity_stores_result() {
    let (controller, _api, _identity) = signed_in().await;

    let identity = controller.call_identity().await.expect("Failed to call /me");

    assert_eq!(identity.uid, "alice");
    assert_eq!(controller.snapshot().await.identity, Some(identity));
}

// ============================================================================
// Helpers and errors
// ============================================================================

#[test]
fn test_local_filename() {
    assert_eq!(local_filename("u/abc_report.pdf", None), "report.pdf");
    assert_eq!(local_filename("u/plain.txt", None), "plain.txt");
    assert_eq!(local_filename("u/x.txt", Some("../../etc/passwd")), "passwd");
    assert_eq!(local_filename("u/x.txt", Some("  ")), "x.txt");
    assert_eq!(local_filename("u/x.txt", Some("..")), "download");
}

#[test]
fn test_command_error_codes() {
    let http: CommandError = ApiError::Http {
        status: 404,
        body: "missing".to_string(),
    }
    .into();
    assert_eq!(http.code, "HTTP_ERROR");
    assert_eq!(http.message, "missing");

    let auth: CommandError = AuthError::NotSignedIn.into();
    assert_eq!(auth, CommandError::not_authenticated());

    let io: CommandError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
    assert_eq!(io.code, "IO_ERROR");
    assert_eq!(io.to_string(), "IO_ERROR: disk full");
}

#[test]
fn test_controller_event_serialization() {
    let event = ControllerEvent::FilesUpdated {
        total: 3,
        mine: 1,
        admin: true,
    };
    let json = serde_json::to_string(&event).expect("Failed to serialize");
    assert!(json.contains("FilesUpdated"));
    assert!(json.contains("\"mine\":1"));
}
