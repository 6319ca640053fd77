//! Custom backend client for the `/api/auth/*` endpoints.
//!
//! Thin HTTP wrapper. Response interpretation lives in the pure `parse_*`
//! functions so every status/body combination is testable without a server.
//!
//! WIRE SCHEMA
//! ===========
//! Login answers `{success, message?, data: {customToken, user, refreshToken?}}`.
//! `token` is accepted as an alias of `customToken`; no other shapes are tried.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::HttpTimeouts;
use crate::error::AuthError;
use crate::types::User;

const LOGIN_PATH: &str = "/api/auth/login";
const REFRESH_PATH: &str = "/api/auth/refresh";
const VERIFY_PATH: &str = "/api/auth/verify";
const PROFILE_PATH: &str = "/api/auth/profile";
const LOGOUT_PATH: &str = "/api/auth/logout";

// =============================================================================
// SEAM
// =============================================================================

/// Successful backend login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    /// Short-lived token to exchange with the identity provider.
    pub exchange_token: String,
    pub user: User,
    pub refresh_token: Option<String>,
}

/// Successful backend token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub token: String,
    /// Present when the backend rotates the refresh token.
    pub refresh_token: Option<String>,
}

/// Operations the session layer needs from the custom backend.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// `POST /api/auth/login`. `username` is sent as `email`.
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError>;

    /// `POST /api/auth/refresh`.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthError>;

    /// `GET /api/auth/verify` with bearer auth.
    async fn verify(&self, session_token: &str) -> Result<User, AuthError>;

    /// `GET /api/auth/profile` with bearer auth.
    async fn profile(&self, session_token: &str) -> Result<User, AuthError>;

    /// `POST /api/auth/logout` with bearer auth. A 401 counts as success.
    async fn logout(&self, session_token: &str) -> Result<(), AuthError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns [`AuthError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), AuthError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn get_user(&self, path: &str, session_token: &str) -> Result<User, AuthError> {
        let (status, body) = self
            .send(self.http.get(self.url(path)).bearer_auth(session_token))
            .await?;
        parse_user(status, &body)
    }
}

#[async_trait::async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        let body = LoginRequest { email: username, password };
        let (status, body) = self.send(self.http.post(self.url(LOGIN_PATH)).json(&body)).await?;
        parse_login(status, &body)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthError> {
        let body = RefreshRequest { refresh_token };
        let (status, body) = self.send(self.http.post(self.url(REFRESH_PATH)).json(&body)).await?;
        parse_refresh(status, &body)
    }

    async fn verify(&self, session_token: &str) -> Result<User, AuthError> {
        self.get_user(VERIFY_PATH, session_token).await
    }

    async fn profile(&self, session_token: &str) -> Result<User, AuthError> {
        self.get_user(PROFILE_PATH, session_token).await
    }

    async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        let (status, body) = self
            .send(self.http.post(self.url(LOGOUT_PATH)).bearer_auth(session_token))
            .await?;
        parse_logout(status, &body)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    data: Option<LoginData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    #[serde(alias = "token")]
    custom_token: Option<String>,
    user: Option<User>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    user: Option<User>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn rejected(status: u16, message: Option<String>) -> AuthError {
    AuthError::BackendRejected { status, message: message.unwrap_or_else(|| "request failed".to_owned()) }
}

/// Error-status bodies are often JSON with a `message`; fall back to raw text.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<StatusResponse>(body)
        .ok()
        .and_then(|r| r.message)
        .or_else(|| Some(body.trim().to_owned()).filter(|s| !s.is_empty()))
}

fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, AuthError> {
    if !(200..300).contains(&status) {
        return Err(rejected(status, error_message(body)));
    }
    serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

pub(crate) fn parse_login(status: u16, body: &str) -> Result<LoginGrant, AuthError> {
    let resp: LoginResponse = decode(status, body)?;
    if !resp.success {
        return Err(rejected(status, resp.message));
    }
    let data = resp.data.ok_or(AuthError::MissingExchangeToken)?;
    let exchange_token = data
        .custom_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingExchangeToken)?;
    let user = data
        .user
        .ok_or_else(|| AuthError::InvalidResponse("login response missing user".to_owned()))?;
    Ok(LoginGrant { exchange_token, user, refresh_token: data.refresh_token.filter(|t| !t.is_empty()) })
}

pub(crate) fn parse_refresh(status: u16, body: &str) -> Result<RefreshGrant, AuthError> {
    let resp: RefreshResponse = decode(status, body)?;
    if !resp.success {
        return Err(rejected(status, resp.message));
    }
    let token = resp
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse("refresh response missing token".to_owned()))?;
    Ok(RefreshGrant { token, refresh_token: resp.refresh_token.filter(|t| !t.is_empty()) })
}

pub(crate) fn parse_user(status: u16, body: &str) -> Result<User, AuthError> {
    let resp: UserResponse = decode(status, body)?;
    if !resp.success {
        return Err(rejected(status, resp.message));
    }
    resp.user
        .ok_or_else(|| AuthError::InvalidResponse("response missing user".to_owned()))
}

pub(crate) fn parse_logout(status: u16, body: &str) -> Result<(), AuthError> {
    if status == 401 {
        return Ok(());
    }
    let resp: StatusResponse = decode(status, body)?;
    if resp.success { Ok(()) } else { Err(rejected(status, resp.message)) }
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
