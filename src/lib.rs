//! Session bridge between the storefront back-office backend and a federated
//! identity provider.
//!
//! Login goes to the custom backend, which answers with a short-lived exchange
//! token; that token is redeemed with the identity provider for an ID token,
//! and the ID token becomes the session bearer for every other backend call.
//! [`AuthSessionManager`] owns the resulting state and publishes it to
//! [`RouteGuard`] watchers.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod guard;
pub mod identity;
pub mod manager;
pub mod refresh;
pub mod store;
pub mod stub;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use backend::{AuthBackend, HttpBackend};
pub use config::AuthConfig;
pub use error::{AuthError, StoreError};
pub use guard::{GuardDecision, GuardWatch, RouteGuard};
pub use identity::{IdentityProvider, RestIdentityProvider};
pub use manager::{AuthSessionManager, RetryPolicy};
pub use store::{FileStore, MemoryStore, SessionStore};
pub use types::{AuthOutcome, AuthPhase, AuthState, Role, Session, User};
