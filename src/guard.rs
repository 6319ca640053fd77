//! Route guard for protected back-office views.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every protected route applies the same decision table to the published
//! `AuthState`. Rendering is left to the caller; the guard only says what to
//! show. `GuardWatch` re-evaluates on each state transition, so there is no
//! polling and no timer.

use tokio::sync::watch;

use crate::config::DEFAULT_LOGIN_PATH;
use crate::types::AuthState;

/// Where to land after login when no usable return location was preserved.
pub const DEFAULT_HOME_PATH: &str = "/admin";
const DEFAULT_BACK_PATH: &str = "/";

/// What a protected route should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Auth is still resolving; show a placeholder and do not redirect.
    Loading,
    /// Send the visitor to `to`, remembering `return_to` for after login.
    Redirect { to: String, return_to: String },
    /// Signed in without the required role; offer a way back.
    AccessDenied { back_to: String },
    Render,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    require_admin: bool,
    login_path: String,
    back_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self { require_admin: true, login_path: DEFAULT_LOGIN_PATH.to_owned(), back_path: DEFAULT_BACK_PATH.to_owned() }
    }
}

impl RouteGuard {
    /// Admin-only guard redirecting to `/admin/login`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require_admin(mut self, require_admin: bool) -> Self {
        self.require_admin = require_admin;
        self
    }

    #[must_use]
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn back_path(mut self, path: impl Into<String>) -> Self {
        self.back_path = path.into();
        self
    }

    #[must_use]
    pub fn evaluate(&self, state: &AuthState, requested: &str) -> GuardDecision {
        if state.is_loading() {
            return GuardDecision::Loading;
        }
        let Some(user) = state.user() else {
            return GuardDecision::Redirect { to: self.login_path.clone(), return_to: requested.to_owned() };
        };
        if self.require_admin && !user.is_admin() {
            return GuardDecision::AccessDenied { back_to: self.back_path.clone() };
        }
        GuardDecision::Render
    }

    /// Follow `rx`, re-evaluating `requested` on every state change.
    #[must_use]
    pub fn watch(&self, rx: watch::Receiver<AuthState>, requested: impl Into<String>) -> GuardWatch {
        GuardWatch { guard: self.clone(), requested: requested.into(), rx }
    }

    /// Resolve the post-login destination. Only same-origin absolute paths
    /// are honored, and never the login page itself.
    #[must_use]
    pub fn post_login_redirect(&self, return_to: Option<&str>) -> String {
        return_to
            .map(str::trim)
            .filter(|path| path.starts_with('/') && !path.starts_with("//") && !path.contains("://"))
            .filter(|path| path.split(['?', '#']).next() != Some(self.login_path.as_str()))
            .map_or_else(|| DEFAULT_HOME_PATH.to_owned(), str::to_owned)
    }
}

/// Live guard evaluation bound to one requested location.
pub struct GuardWatch {
    guard: RouteGuard,
    requested: String,
    rx: watch::Receiver<AuthState>,
}

impl GuardWatch {
    /// Decision for the latest published state.
    pub fn current(&mut self) -> GuardDecision {
        let state = self.rx.borrow_and_update().clone();
        self.guard.evaluate(&state, &self.requested)
    }

    /// Wait for the next state change. `None` once the manager is dropped.
    pub async fn next(&mut self) -> Option<GuardDecision> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
