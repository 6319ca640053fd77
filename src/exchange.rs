//! Credential exchange: backend login bridged into an identity session.
//!
//! FLOW
//! ====
//! 1. `POST /api/auth/login` returns a short-lived custom token.
//! 2. The identity provider swaps it for a session; its ID token becomes the
//!    bearer token persisted as `authToken`.
//! 3. A backend-issued refresh token, when present, is persisted too.
//!
//! DEMO MODE
//! =========
//! When enabled, any failure of the flow above falls back to the two
//! hardcoded demo credential pairs, which synthesize an admin user and a
//! 24-hour legacy session without contacting any service. Disabled unless
//! `AUTH_DEMO_MODE` is set.

use std::sync::Arc;

use crate::backend::AuthBackend;
use crate::clock::{Clock, LEGACY_SESSION_TTL_MS};
use crate::error::{AuthError, StoreError};
use crate::identity::IdentityProvider;
use crate::store::SessionVault;
use crate::types::{Role, User};

/// Username/password pairs accepted offline in demo mode.
pub const DEMO_CREDENTIALS: [(&str, &str); 2] = [("admin", "admin123"), ("demo", "demo123")];

#[must_use]
pub fn is_demo_credentials(username: &str, password: &str) -> bool {
    DEMO_CREDENTIALS
        .iter()
        .any(|(u, p)| *u == username && *p == password)
}

fn demo_user(username: &str) -> User {
    User {
        id: format!("demo-{username}"),
        username: username.to_owned(),
        email: format!("{username}@demo.local"),
        role: Role::Admin,
    }
}

pub struct CredentialExchangeClient {
    backend: Arc<dyn AuthBackend>,
    identity: Arc<dyn IdentityProvider>,
    vault: SessionVault,
    clock: Arc<dyn Clock>,
    demo_mode: bool,
}

impl CredentialExchangeClient {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        identity: Arc<dyn IdentityProvider>,
        vault: SessionVault,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { backend, identity, vault, clock, demo_mode: false }
    }

    #[must_use]
    pub fn with_demo_mode(mut self, enabled: bool) -> Self {
        self.demo_mode = enabled;
        self
    }

    #[must_use]
    pub fn demo_mode(&self) -> bool {
        self.demo_mode
    }

    /// Log in and persist the resulting session.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the backend/identity flow unless demo mode
    /// accepted the credentials instead. A failure to persist the demo session
    /// is logged and the original error returned.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        match self.exchange(username, password).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, role = ?user.role, "login succeeded");
                Ok(user)
            }
            Err(e) => {
                match self.demo_login(username, password) {
                    Ok(Some(user)) => {
                        tracing::warn!(error = %e, username, "backend login failed; using demo session");
                        return Ok(user);
                    }
                    Ok(None) => {}
                    Err(store_err) => tracing::error!(error = %store_err, "failed to persist demo session"),
                }
                tracing::info!(code = e.error_code(), error = %e, "login failed");
                Err(e)
            }
        }
    }

    async fn exchange(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let grant = self.backend.login(username, password).await?;
        let session = self
            .identity
            .exchange_custom_token(&grant.exchange_token)
            .await
            .map_err(|e| match e {
                AuthError::IdentityExchangeFailed(_) => e,
                other => AuthError::IdentityExchangeFailed(other.to_string()),
            })?;

        if let Err(e) = self.persist(&session.id_token, grant.refresh_token.as_deref()) {
            // No local record of the session would remain to sign it out later.
            if let Err(sign_out_err) = self.identity.sign_out().await {
                tracing::warn!(error = %sign_out_err, "identity sign-out after failed persist also failed");
            }
            return Err(e.into());
        }
        Ok(grant.user)
    }

    fn persist(&self, session_token: &str, refresh_token: Option<&str>) -> Result<(), StoreError> {
        self.vault.set_session_token(session_token)?;
        if let Some(refresh_token) = refresh_token {
            self.vault.set_refresh_token(refresh_token)?;
        }
        Ok(())
    }

    fn demo_login(&self, username: &str, password: &str) -> Result<Option<User>, AuthError> {
        if !self.demo_mode || !is_demo_credentials(username, password) {
            return Ok(None);
        }
        let user = demo_user(username);
        // A stale token would outrank the legacy session on the next startup.
        self.vault.clear_tokens()?;
        self.vault
            .set_legacy_session(&user, self.clock.now_ms() + LEGACY_SESSION_TTL_MS)?;
        Ok(Some(user))
    }

    /// Revoke the backend session and sign out of the identity provider.
    ///
    /// Both steps are always attempted; the first failure is returned. Local
    /// storage is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns the first remote failure.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let mut first_err: Option<AuthError> = None;

        match self.vault.session_token() {
            Ok(Some(token)) => {
                if let Err(e) = self.backend.logout(&token).await {
                    tracing::warn!(error = %e, "backend logout failed");
                    first_err.get_or_insert(e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                first_err.get_or_insert(e.into());
            }
        }

        if self.identity.current_session().is_some() {
            if let Err(e) = self.identity.sign_out().await {
                tracing::warn!(error = %e, "identity sign-out failed");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
#[path = "exchange_test.rs"]
mod tests;
