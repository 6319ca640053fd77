//! Token refresh: identity session first, backend refresh token second.

use std::sync::Arc;

use crate::backend::AuthBackend;
use crate::error::AuthError;
use crate::identity::IdentityProvider;
use crate::store::SessionVault;

pub struct TokenRefreshClient {
    backend: Arc<dyn AuthBackend>,
    identity: Arc<dyn IdentityProvider>,
    vault: SessionVault,
}

impl TokenRefreshClient {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, identity: Arc<dyn IdentityProvider>, vault: SessionVault) -> Self {
        Self { backend, identity, vault }
    }

    /// Obtain and persist a fresh session token.
    ///
    /// A live identity session is always force-refreshed directly; the
    /// backend refresh endpoint is only used when no such session exists.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoRefreshTokenAvailable`] when neither source
    /// exists, or the failure of the chosen refresh path.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        if self.identity.current_session().is_some() {
            let token = self.identity.id_token(true).await?;
            self.vault.set_session_token(&token)?;
            tracing::debug!("refreshed session token from identity provider");
            return Ok(token);
        }

        let Some(refresh_token) = self.vault.refresh_token()? else {
            return Err(AuthError::NoRefreshTokenAvailable);
        };

        let grant = self.backend.refresh(&refresh_token).await?;
        self.vault.set_session_token(&grant.token)?;
        if let Some(rotated) = &grant.refresh_token {
            self.vault.set_refresh_token(rotated)?;
        }
        tracing::debug!(rotated = grant.refresh_token.is_some(), "refreshed session token from backend");
        Ok(grant.token)
    }
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
