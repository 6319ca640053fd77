//! Federated identity provider seam and its REST implementation.
//!
//! ARCHITECTURE
//! ============
//! The provider is an external collaborator consumed through four operations:
//! exchange a custom token for a session, read (optionally force-refreshing)
//! the session's ID token, sign out, and inspect the current session.
//! `RestIdentityProvider` speaks the secure-token REST dialect
//! (`accounts:signInWithCustomToken`, `token`). The live session is cached in
//! memory and, when a `SessionVault` is attached, persisted under
//! `identitySession` so a later process can restore and refresh it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::HttpTimeouts;
use crate::error::AuthError;
use crate::store::SessionVault;
pub use crate::types::IdentitySession;

/// ID tokens are refreshed this long before their reported expiry.
const EXPIRY_SKEW_MS: i64 = 60_000;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Swap a backend-issued custom token for a provider session.
    async fn exchange_custom_token(&self, custom_token: &str) -> Result<IdentitySession, AuthError>;

    /// ID token of the current session, refreshed when expired or when
    /// `force_refresh` is set.
    async fn id_token(&self, force_refresh: bool) -> Result<String, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_session(&self) -> Option<IdentitySession>;
}

// =============================================================================
// REST PROVIDER
// =============================================================================

pub struct RestIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    clock: Arc<dyn Clock>,
    vault: Option<SessionVault>,
    current: Mutex<Option<IdentitySession>>,
}

impl RestIdentityProvider {
    /// # Errors
    ///
    /// Returns [`AuthError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            clock: Arc::new(SystemClock),
            vault: None,
            current: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist the session through `vault` and restore it on first use.
    #[must_use]
    pub fn with_vault(mut self, vault: SessionVault) -> Self {
        self.vault = Some(vault);
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .query(&[("key", self.api_key.as_str())])
    }

    fn store_session(&self, session: IdentitySession) {
        if let Some(vault) = &self.vault {
            if let Err(e) = vault.set_identity_session(&session) {
                tracing::warn!(error = %e, "failed to persist identity session");
            }
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(session);
        }
    }

    fn restore_session(&self) -> Option<IdentitySession> {
        let vault = self.vault.as_ref()?;
        match vault.identity_session() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read identity session");
                None
            }
        }
    }

    fn expires_at(&self, expires_in: Option<&str>) -> i64 {
        let secs = expires_in
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        self.clock.now_ms() + secs * 1000
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<IdentitySession, AuthError> {
        let body = TokenRequest { grant_type: "refresh_token", refresh_token };
        let response = self.post("/v1/token").json(&body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(AuthError::IdentityExchangeFailed(format!(
                "token refresh rejected ({status}): {}",
                provider_message(&text)
            )));
        }
        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(IdentitySession {
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_at_ms: self.expires_at(parsed.expires_in.as_deref()),
        })
    }
}

#[async_trait::async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn exchange_custom_token(&self, custom_token: &str) -> Result<IdentitySession, AuthError> {
        let body = SignInRequest { token: custom_token, return_secure_token: true };
        let response = self
            .post("/v1/accounts:signInWithCustomToken")
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::IdentityExchangeFailed(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::IdentityExchangeFailed(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(AuthError::IdentityExchangeFailed(format!("{status}: {}", provider_message(&text))));
        }
        let parsed: SignInResponse =
            serde_json::from_str(&text).map_err(|e| AuthError::IdentityExchangeFailed(e.to_string()))?;

        let session = IdentitySession {
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_at_ms: self.expires_at(parsed.expires_in.as_deref()),
        };
        self.store_session(session.clone());
        Ok(session)
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        let current = self.current_session().ok_or(AuthError::NoSession)?;
        if !force_refresh && current.expires_at_ms - EXPIRY_SKEW_MS > self.clock.now_ms() {
            return Ok(current.id_token);
        }
        let refreshed = self.refresh_session(&current.refresh_token).await?;
        let token = refreshed.id_token.clone();
        self.store_session(refreshed);
        Ok(token)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        if let Some(vault) = &self.vault {
            vault.clear_identity_session()?;
        }
        Ok(())
    }

    fn current_session(&self) -> Option<IdentitySession> {
        let mut current = self.current.lock().ok()?;
        if current.is_none() {
            *current = self.restore_session();
        }
        current.clone()
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Provider errors look like `{"error": {"message": "INVALID_CUSTOM_TOKEN"}}`.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<ProviderError>(body).map_or_else(|_| body.trim().to_owned(), |e| e.error.message)
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
