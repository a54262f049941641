//! Firebase Auth REST provider.
//!
//! Password sign-in goes through the Identity Toolkit endpoint; ID tokens are
//! renewed through the Secure Token endpoint. The refresh token is persisted
//! with a [`CredentialStore`] so that [`FirebaseAuth::restore`] can resume the
//! session in a later process.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use super::{AuthError, AuthResult, AuthStateChange, AuthUser, Credentials, IdentityProvider};
use crate::storage::{CredentialStore, KeychainBackend, StoredCredential};

/// Default Identity Toolkit base URL.
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";

/// Default Secure Token base URL.
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com";

/// Cached tokens are renewed when they expire within this margin.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Lifetime assumed when the provider omits or garbles `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Buffer size for the auth-state broadcast channel.
const EVENT_BUFFER_SIZE: usize = 16;

/// Endpoints and API key for a Firebase project.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Web API key of the Firebase project.
    pub api_key: String,
    /// Identity Toolkit base URL.
    pub identity_url: String,
    /// Secure Token base URL.
    pub token_url: String,
}

impl FirebaseConfig {
    /// Configuration for the public Firebase endpoints.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Point the provider at different endpoints (emulators, tests).
    pub fn with_endpoints(
        mut self,
        identity_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.identity_url = identity_url.into();
        self.token_url = token_url.into();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Tokens held for the signed-in user.
struct TokenState {
    user: AuthUser,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl TokenState {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + REFRESH_MARGIN
    }
}

fn expiry_from(expires_in: Option<&str>) -> Instant {
    let secs = expires_in
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Instant::now() + Duration::from_secs(secs)
}

/// Firebase Auth identity provider.
pub struct FirebaseAuth<B: KeychainBackend> {
    http: Client,
    config: FirebaseConfig,
    store: CredentialStore<B>,
    state: RwLock<Option<TokenState>>,
    event_tx: broadcast::Sender<AuthStateChange>,
}

impl<B: KeychainBackend> FirebaseAuth<B> {
    /// Create a provider that persists its refresh credential in `store`.
    pub fn new(config: FirebaseConfig, store: CredentialStore<B>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            http: Client::new(),
            config,
            store,
            state: RwLock::new(None),
            event_tx,
        }
    }

    /// Resume a session from the persisted refresh credential.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored credential was
    /// rejected (in which case it is removed).
    pub async fn restore(&self) -> AuthResult<Option<AuthUser>> {
        let Some(stored) = self.store.load()? else {
            tracing::debug!("No stored credential to restore");
            return Ok(None);
        };

        let refreshed = match self.refresh(&stored.refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(AuthError::Rejected(reason)) => {
                tracing::warn!("Stored credential rejected ({}), discarding it", reason);
                self.store.clear()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let user = AuthUser {
            uid: refreshed.user_id.clone(),
            email: stored.email.clone(),
        };

        self.persist(&user, &refreshed.refresh_token);
        self.install(TokenState {
            user: user.clone(),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            expires_at: expiry_from(refreshed.expires_in.as_deref()),
        })
        .await;

        tracing::info!("Restored session for {}", user.uid);
        Ok(Some(user))
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshResponse> {
        let url = format!(
            "{}/v1/token?key={}",
            self.config.token_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.api_key)
        );
        let request = self.http.post(url).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ]);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> AuthResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(AuthError::Rejected(reason));
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))
    }

    /// Persist a credential, logging instead of failing on keychain errors.
    fn persist(&self, user: &AuthUser, refresh_token: &str) {
        let credential = StoredCredential {
            uid: user.uid.clone(),
            email: user.email.clone(),
            refresh_token: refresh_token.to_string(),
        };
        if let Err(e) = self.store.save(&credential) {
            tracing::warn!("Failed to persist credential: {}", e);
        }
    }

    async fn install(&self, state: TokenState) {
        let user = state.user.clone();
        *self.state.write().await = Some(state);
        self.emit(AuthStateChange::SignedIn(user));
    }

    fn emit(&self, change: AuthStateChange) {
        // No subscribers is fine.
        let _ = self.event_tx.send(change);
    }
}

#[async_trait]
impl<B: KeychainBackend> IdentityProvider for FirebaseAuth<B> {
    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        let url = format!(
            "{}/v1/accounts:signInWithPassword?key={}",
            self.config.identity_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.api_key)
        );
        let request = self.http.post(url).json(&SignInRequest {
            email: &credentials.email,
            password: &credentials.password,
            return_secure_token: true,
        });

        let response: SignInResponse = self.send(request).await?;
        let user = AuthUser {
            uid: response.local_id,
            email: response.email.or_else(|| Some(credentials.email.clone())),
        };

        self.persist(&user, &response.refresh_token);
        self.install(TokenState {
            user: user.clone(),
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at: expiry_from(response.expires_in.as_deref()),
        })
        .await;

        tracing::info!("Signed in as {}", user.uid);
        Ok(user)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let was_signed_in = self.state.write().await.take().is_some();
        if was_signed_in {
            tracing::info!("Signed out");
        }
        self.emit(AuthStateChange::SignedOut);
        self.store.clear()?;
        Ok(())
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.state.read().await.as_ref().map(|s| s.user.clone())
    }

    async fn id_token(&self, force_refresh: bool) -> AuthResult<String> {
        {
            let guard = self.state.read().await;
            let state = guard.as_ref().ok_or(AuthError::NotSignedIn)?;
            if !force_refresh && state.is_fresh() {
                return Ok(state.id_token.clone());
            }
        }

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(AuthError::NotSignedIn)?;

        tracing::debug!("Refreshing ID token (forced: {})", force_refresh);
        let refreshed = self.refresh(&state.refresh_token).await?;

        if refreshed.refresh_token != state.refresh_token {
            self.persist(&state.user, &refreshed.refresh_token);
        }
        if refreshed.user_id != state.user.uid {
            tracing::warn!(
                "Token refresh returned user {} for {}",
                refreshed.user_id,
                state.user.uid
            );
        }

        state.id_token = refreshed.id_token;
        state.refresh_token = refreshed.refresh_token;
        state.expires_at = expiry_from(refreshed.expires_in.as_deref());

        Ok(state.id_token.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.event_tx.subscribe()
    }
}
