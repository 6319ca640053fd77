//! Error taxonomy for the auth bridge.
//!
//! ERROR HANDLING
//! ==============
//! Clients return `Result<_, AuthError>` and propagate with `?`. The session
//! manager is the boundary: it logs these errors and converts them into
//! `bool`/`Option`/`AuthOutcome` so callers never handle transport failures.

/// Failures from the session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Failures from login, refresh, verify, profile and logout calls.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The custom backend answered with an error status or `success: false`.
    #[error("backend rejected request ({status}): {message}")]
    BackendRejected { status: u16, message: String },

    /// The backend reported a successful login without an exchange token.
    #[error("login response did not include an exchange token")]
    MissingExchangeToken,

    /// The identity provider refused the exchange token.
    #[error("identity provider rejected exchange token: {0}")]
    IdentityExchangeFailed(String),

    #[error("no identity session or refresh token available")]
    NoRefreshTokenAvailable,

    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// An operation needed a cached session token and none was stored.
    #[error("no session token cached")]
    NoSession,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    #[error("config error: {0}")]
    Config(String),
}

impl AuthError {
    /// Stable machine-readable code for logs and CLI output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BackendRejected { .. } => "E_BACKEND_REJECTED",
            Self::MissingExchangeToken => "E_MISSING_EXCHANGE_TOKEN",
            Self::IdentityExchangeFailed(_) => "E_IDENTITY_EXCHANGE_FAILED",
            Self::NoRefreshTokenAvailable => "E_NO_REFRESH_TOKEN",
            Self::Network(_) => "E_NETWORK",
            Self::NoSession => "E_NO_SESSION",
            Self::InvalidResponse(_) => "E_INVALID_RESPONSE",
            Self::Store(_) => "E_STORE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Config(_) => "E_CONFIG",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::BackendRejected { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
