//! In-process stub of the storefront backend and identity provider.
//!
//! SYSTEM CONTEXT
//! ==============
//! Serves the five `/api/auth/*` endpoints plus the identity REST surface
//! under `/identity` from a single axum router, so the HTTP clients can be
//! exercised end-to-end without external services. The CLI exposes it as
//! `serve-stub` for offline development.
//!
//! Tokens are random hex strings held in memory. `expire_session` drops an
//! ID token server-side to simulate expiry.

use std::collections::HashMap;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::types::{Role, User};

const ID_TOKEN_TTL_SECS: &str = "3600";

/// Login credentials the stub accepts.
#[derive(Debug, Clone)]
pub struct StubAccount {
    pub email: String,
    pub password: String,
    pub user: User,
}

impl StubAccount {
    #[must_use]
    pub fn new(email: &str, password: &str, username: &str, role: Role) -> Self {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_owned(),
            email: email.to_owned(),
            role,
        };
        Self { email: email.to_owned(), password: password.to_owned(), user }
    }
}

#[derive(Default)]
struct StubInner {
    accounts: Vec<StubAccount>,
    /// custom token -> user id (single use)
    custom_tokens: HashMap<String, String>,
    /// identity ID token -> user id; these are the backend session tokens
    id_tokens: HashMap<String, String>,
    /// identity refresh token -> user id
    identity_refresh: HashMap<String, String>,
    /// backend refresh token -> user id
    backend_refresh: HashMap<String, String>,
    backend_refresh_enabled: bool,
    /// When set, identity calls must carry this value as `?key=`.
    identity_api_key: Option<String>,
    logouts: usize,
}

impl StubInner {
    fn user(&self, user_id: &str) -> Option<User> {
        self.accounts
            .iter()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
    }

    fn issue_id_token(&mut self, user_id: &str) -> String {
        let token = generate_token();
        self.id_tokens.insert(token.clone(), user_id.to_owned());
        token
    }
}

/// Shared handle to the stub's state. Clones share the same state.
#[derive(Clone)]
pub struct StubBackend {
    inner: Arc<Mutex<StubInner>>,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::with_default_accounts()
    }
}

impl StubBackend {
    #[must_use]
    pub fn new(accounts: Vec<StubAccount>) -> Self {
        let inner = StubInner { accounts, backend_refresh_enabled: true, ..StubInner::default() };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    /// One admin (`admin@example.com` / `admin-pass`) and one non-admin
    /// (`editor@example.com` / `editor-pass`).
    #[must_use]
    pub fn with_default_accounts() -> Self {
        Self::new(vec![
            StubAccount::new("admin@example.com", "admin-pass", "admin", Role::Admin),
            StubAccount::new("editor@example.com", "editor-pass", "editor", Role::User),
        ])
    }

    fn lock(&self) -> MutexGuard<'_, StubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// User registered for `email`, if any.
    #[must_use]
    pub fn account_user(&self, email: &str) -> Option<User> {
        self.lock()
            .accounts
            .iter()
            .find(|a| a.email == email)
            .map(|a| a.user.clone())
    }

    /// Invalidate a session token server-side.
    pub fn expire_session(&self, token: &str) {
        self.lock().id_tokens.remove(token);
    }

    /// Invalidate every outstanding session token.
    pub fn expire_all_sessions(&self) {
        self.lock().id_tokens.clear();
    }

    /// Toggle whether login issues backend refresh tokens and whether
    /// `/api/auth/refresh` honors them.
    pub fn set_backend_refresh_enabled(&self, enabled: bool) {
        self.lock().backend_refresh_enabled = enabled;
    }

    /// Revoke every identity refresh token, so only a backend refresh token
    /// can mint new sessions.
    pub fn revoke_identity_sessions(&self) {
        self.lock().identity_refresh.clear();
    }

    /// Reject identity calls whose `key` query parameter differs from `key`.
    pub fn require_identity_api_key(&self, key: &str) {
        self.lock().identity_api_key = Some(key.to_owned());
    }

    #[must_use]
    pub fn is_session_valid(&self, token: &str) -> bool {
        self.lock().id_tokens.contains_key(token)
    }

    /// Number of successful `/api/auth/logout` calls.
    #[must_use]
    pub fn logout_count(&self) -> usize {
        self.lock().logouts
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/verify", get(current_user))
            .route("/api/auth/profile", get(current_user))
            .route("/api/auth/logout", post(logout))
            .route("/identity/v1/accounts:signInWithCustomToken", post(sign_in_with_custom_token))
            .route("/identity/v1/token", post(refresh_id_token))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Bind to `addr` and serve in a background task, returning the bound address.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the listener cannot bind.
    pub async fn spawn(&self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let app = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "stub backend stopped");
            }
        });
        tracing::info!(%local, "stub backend listening");
        Ok(local)
    }

    /// Serve on an ephemeral loopback port.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the listener cannot bind.
    pub async fn spawn_local(&self) -> std::io::Result<SocketAddr> {
        self.spawn(SocketAddr::from(([127, 0, 0, 1], 0))).await
    }
}

/// Cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "success": false, "message": message }))).into_response()
}

fn provider_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": { "code": 400, "message": message } }))).into_response()
}

// =============================================================================
// BACKEND HANDLERS
// =============================================================================

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

/// `POST /api/auth/login`: accepts the account email or username as `email`.
async fn login(State(stub): State<StubBackend>, Json(body): Json<LoginBody>) -> Response {
    let mut inner = stub.lock();
    let Some(user) = inner
        .accounts
        .iter()
        .find(|a| (a.email == body.email || a.user.username == body.email) && a.password == body.password)
        .map(|a| a.user.clone())
    else {
        return unauthorized("Invalid credentials");
    };

    let custom_token = generate_token();
    inner.custom_tokens.insert(custom_token.clone(), user.id.clone());
    let refresh_token = if inner.backend_refresh_enabled {
        let token = generate_token();
        inner.backend_refresh.insert(token.clone(), user.id.clone());
        Some(token)
    } else {
        None
    };

    Json(json!({
        "success": true,
        "data": { "customToken": custom_token, "user": user, "refreshToken": refresh_token },
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: String,
}

/// `POST /api/auth/refresh`: rotates the refresh token.
async fn refresh(State(stub): State<StubBackend>, Json(body): Json<RefreshBody>) -> Response {
    let mut inner = stub.lock();
    if !inner.backend_refresh_enabled {
        return unauthorized("Refresh disabled");
    }
    let Some(user_id) = inner.backend_refresh.remove(&body.refresh_token) else {
        return unauthorized("Invalid refresh token");
    };
    let token = inner.issue_id_token(&user_id);
    let rotated = generate_token();
    inner.backend_refresh.insert(rotated.clone(), user_id);
    Json(json!({ "success": true, "token": token, "refreshToken": rotated })).into_response()
}

/// `GET /api/auth/verify` and `GET /api/auth/profile`.
async fn current_user(State(stub): State<StubBackend>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers) else {
        return unauthorized("Missing bearer token");
    };
    let inner = stub.lock();
    let Some(user) = inner.id_tokens.get(token).and_then(|id| inner.user(id)) else {
        return unauthorized("Invalid or expired session");
    };
    Json(json!({ "success": true, "user": user })).into_response()
}

/// `POST /api/auth/logout`.
async fn logout(State(stub): State<StubBackend>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers) else {
        return unauthorized("Missing bearer token");
    };
    let mut inner = stub.lock();
    if inner.id_tokens.remove(token).is_none() {
        return unauthorized("Invalid or expired session");
    }
    inner.logouts += 1;
    Json(json!({ "success": true })).into_response()
}

// =============================================================================
// IDENTITY HANDLERS
// =============================================================================

#[derive(Deserialize)]
struct ApiKeyParams {
    key: Option<String>,
}

impl StubInner {
    fn api_key_accepted(&self, params: &ApiKeyParams) -> bool {
        self.identity_api_key
            .as_deref()
            .is_none_or(|expected| params.key.as_deref() == Some(expected))
    }
}

#[derive(Deserialize)]
struct SignInBody {
    token: String,
}

/// `POST /identity/v1/accounts:signInWithCustomToken`.
async fn sign_in_with_custom_token(
    State(stub): State<StubBackend>,
    Query(params): Query<ApiKeyParams>,
    Json(body): Json<SignInBody>,
) -> Response {
    let mut inner = stub.lock();
    if !inner.api_key_accepted(&params) {
        return provider_error("API_KEY_INVALID");
    }
    let Some(user_id) = inner.custom_tokens.remove(&body.token) else {
        return provider_error("INVALID_CUSTOM_TOKEN");
    };
    let id_token = inner.issue_id_token(&user_id);
    let refresh_token = generate_token();
    inner.identity_refresh.insert(refresh_token.clone(), user_id);
    Json(json!({ "idToken": id_token, "refreshToken": refresh_token, "expiresIn": ID_TOKEN_TTL_SECS }))
        .into_response()
}

#[derive(Deserialize)]
struct TokenBody {
    grant_type: String,
    refresh_token: String,
}

/// `POST /identity/v1/token`.
async fn refresh_id_token(
    State(stub): State<StubBackend>,
    Query(params): Query<ApiKeyParams>,
    Json(body): Json<TokenBody>,
) -> Response {
    if body.grant_type != "refresh_token" {
        return provider_error("INVALID_GRANT_TYPE");
    }
    let mut inner = stub.lock();
    if !inner.api_key_accepted(&params) {
        return provider_error("API_KEY_INVALID");
    }
    let Some(user_id) = inner.identity_refresh.get(&body.refresh_token).cloned() else {
        return provider_error("INVALID_REFRESH_TOKEN");
    };
    let id_token = inner.issue_id_token(&user_id);
    Json(json!({ "id_token": id_token, "refresh_token": body.refresh_token, "expires_in": ID_TOKEN_TTL_SECS }))
        .into_response()
}

#[cfg(test)]
#[path = "stub_test.rs"]
mod tests;
