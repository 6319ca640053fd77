//! Auth session manager: the single owner of process-wide auth state.
//!
//! ARCHITECTURE
//! ============
//! One `AuthSessionManager` is created at startup and shared as
//! `Arc<AuthSessionManager>`. It drives the state machine
//! `Uninitialized -> Loading -> {Authenticated, Unauthenticated}` and
//! publishes every transition on a `tokio::sync::watch` channel so route
//! guards re-evaluate without polling.
//!
//! ERROR HANDLING
//! ==============
//! This is the boundary where `AuthError` stops. Public operations return
//! `bool`, `Option<User>` or `AuthOutcome`; failures are logged. `logout`
//! clears local state even when every remote call fails.
//!
//! STARTUP RECOVERY
//! ================
//! A cached session token is verified, refreshed and re-verified at most
//! `RetryPolicy::max_retries` times. Without a token, the legacy cached user
//! is adopted while `now < sessionExpiry`, with no backend contact.

use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::{AuthBackend, HttpBackend};
use crate::clock::{Clock, LEGACY_SESSION_TTL_MS, SystemClock};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::exchange::CredentialExchangeClient;
use crate::identity::{IdentityProvider, RestIdentityProvider};
use crate::refresh::TokenRefreshClient;
use crate::store::{SessionStore, SessionVault};
use crate::types::{AuthOutcome, AuthState, User};

/// Shown to end users for any failed login.
pub const LOGIN_FAILED_MESSAGE: &str = "Invalid username or password";

/// Bound on verify-after-refresh attempts during startup recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

pub struct AuthSessionManager {
    backend: Arc<dyn AuthBackend>,
    exchange: CredentialExchangeClient,
    refresher: TokenRefreshClient,
    vault: SessionVault,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    state: watch::Sender<AuthState>,
}

impl AuthSessionManager {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let vault = SessionVault::new(store);
        let exchange = CredentialExchangeClient::new(backend.clone(), identity.clone(), vault.clone(), clock.clone());
        let refresher = TokenRefreshClient::new(backend.clone(), identity, vault.clone());
        let (state, _) = watch::channel(AuthState::default());
        Self { backend, exchange, refresher, vault, clock, retry: RetryPolicy::default(), state }
    }

    /// Wire the HTTP backend and REST identity provider from `config`. The
    /// identity session is persisted in `store` alongside the tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig, store: Arc<dyn SessionStore>) -> Result<Self, AuthError> {
        let backend = HttpBackend::new(config.api_base_url.clone(), config.timeouts)?;
        let identity = RestIdentityProvider::new(
            config.identity_base_url.clone(),
            config.identity_api_key.clone(),
            config.timeouts,
        )?
        .with_vault(SessionVault::new(store.clone()));
        Ok(Self::new(Arc::new(backend), Arc::new(identity), store, Arc::new(SystemClock)).with_demo_mode(config.demo_mode))
    }

    #[must_use]
    pub fn with_demo_mode(mut self, enabled: bool) -> Self {
        if enabled {
            tracing::warn!("demo-mode login bypass enabled");
        }
        self.exchange = self.exchange.with_demo_mode(enabled);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Snapshot of the current auth state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// Cached session token for other authenticated calls.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.vault.session_token().ok().flatten()
    }

    fn publish(&self, state: AuthState) {
        self.state.send_replace(state);
    }

    fn clear_storage(&self) {
        if let Err(e) = self.vault.clear_all() {
            tracing::error!(error = %e, "failed to clear session storage");
        }
    }

    // =========================================================================
    // STARTUP RECOVERY
    // =========================================================================

    /// Resolve the initial auth state from persisted session material.
    pub async fn init(&self) -> AuthState {
        self.publish(AuthState::loading());

        let settled = match self.recover().await {
            Ok(Some(user)) => {
                tracing::info!(user_id = %user.id, "session restored");
                AuthState::authenticated(user)
            }
            Ok(None) => AuthState::unauthenticated(),
            Err(e) => {
                tracing::error!(code = e.error_code(), error = %e, "session recovery failed");
                self.clear_storage();
                AuthState::unauthenticated()
            }
        };

        self.publish(settled.clone());
        settled
    }

    async fn recover(&self) -> Result<Option<User>, AuthError> {
        match self.vault.session_token()? {
            Some(token) => self.recover_token_session(token).await,
            None => self.recover_legacy_session(),
        }
    }

    async fn recover_token_session(&self, mut token: String) -> Result<Option<User>, AuthError> {
        let mut retries = 0;
        loop {
            match self.backend.verify(&token).await {
                Ok(user) => return Ok(Some(user)),
                Err(e) => tracing::info!(retries, error = %e, "session verify failed"),
            }
            if retries >= self.retry.max_retries {
                break;
            }
            retries += 1;
            match self.refresher.refresh().await {
                Ok(fresh) => token = fresh,
                Err(e) => {
                    tracing::info!(error = %e, "session refresh failed");
                    break;
                }
            }
        }

        self.vault.clear_all()?;
        Ok(None)
    }

    fn recover_legacy_session(&self) -> Result<Option<User>, AuthError> {
        let user = self.vault.legacy_user()?;
        let expiry = self.vault.legacy_expiry()?;
        match (user, expiry) {
            (Some(user), Some(expires_at)) if self.clock.now_ms() < expires_at => Ok(Some(user)),
            (None, None) => Ok(None),
            _ => {
                tracing::info!("legacy session expired");
                self.vault.clear_legacy()?;
                Ok(None)
            }
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Returns `true` and publishes `Authenticated` on success.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        let Ok(user) = self.exchange.login(username, password).await else {
            return false;
        };
        let expires_at = self.clock.now_ms() + LEGACY_SESSION_TTL_MS;
        if let Err(e) = self.vault.set_legacy_session(&user, expires_at) {
            tracing::warn!(error = %e, "failed to write legacy session cache");
        }
        self.publish(AuthState::authenticated(user));
        true
    }

    /// Sign out remotely, then clear local state regardless of the outcome.
    pub async fn logout(&self) {
        if let Err(e) = self.exchange.sign_out().await {
            tracing::warn!(code = e.error_code(), error = %e, "remote sign-out failed; clearing local session");
        }
        self.clear_storage();
        self.publish(AuthState::unauthenticated());
        tracing::info!("logged out");
    }

    /// Fetch the current profile. Failure leaves existing state untouched.
    pub async fn get_profile(&self) -> Option<User> {
        let token = match self.vault.session_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read session token");
                return None;
            }
        };
        match self.backend.profile(&token).await {
            Ok(user) => {
                self.publish(AuthState::authenticated(user.clone()));
                Some(user)
            }
            Err(e) => {
                tracing::warn!(code = e.error_code(), error = %e, "profile fetch failed");
                None
            }
        }
    }

    /// Refresh the session token; `true` on success.
    pub async fn refresh_token(&self) -> bool {
        match self.refresher.refresh().await {
            Ok(_) => true,
            Err(e) => {
                tracing::info!(code = e.error_code(), error = %e, "token refresh failed");
                false
            }
        }
    }

    /// Verify the cached session token and adopt the returned user.
    pub async fn verify(&self) -> AuthOutcome {
        let token = match self.vault.session_token() {
            Ok(Some(token)) => token,
            Ok(None) => return AuthOutcome::failed("No active session"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read session token");
                return AuthOutcome::failed("Session storage unavailable");
            }
        };
        match self.backend.verify(&token).await {
            Ok(user) => {
                self.publish(AuthState::authenticated(user));
                AuthOutcome::ok()
            }
            Err(e) => {
                tracing::info!(code = e.error_code(), error = %e, "session verify failed");
                AuthOutcome::failed("Session is no longer valid")
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
