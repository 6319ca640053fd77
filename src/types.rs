//! Shared auth value types.
//!
//! DESIGN
//! ======
//! `User` is an immutable value object: every login, verify, refresh or
//! profile fetch replaces it wholesale. `AuthState` stores only the phase, so
//! the authenticated flag is always derived from the presence of a user.

use serde::{Deserialize, Serialize};

// =============================================================================
// USER
// =============================================================================

/// Back-office role assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Authenticated operator as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Persisted session material. `expires_at` is only populated on the legacy
/// cached-user path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds.
    pub expires_at: Option<i64>,
}

/// Live identity-provider session. Persisted under `identitySession` so a
/// restarted process can still refresh through the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySession {
    pub id_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expires_at_ms: i64,
}

// =============================================================================
// AUTH STATE
// =============================================================================

/// Lifecycle of the process-wide auth state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthPhase {
    /// Startup recovery has not begun.
    #[default]
    Uninitialized,
    /// Startup recovery is in flight.
    Loading,
    Authenticated(User),
    Unauthenticated,
}

/// UI-visible auth state published by the session manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub phase: AuthPhase,
}

impl AuthState {
    #[must_use]
    pub fn authenticated(user: User) -> Self {
        Self { phase: AuthPhase::Authenticated(user) }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self { phase: AuthPhase::Unauthenticated }
    }

    #[must_use]
    pub fn loading() -> Self {
        Self { phase: AuthPhase::Loading }
    }

    /// Current user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match &self.phase {
            AuthPhase::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// `true` until startup recovery has settled.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, AuthPhase::Uninitialized | AuthPhase::Loading)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Structured result returned by public operations instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self { success: true, message: None }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()) }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
