//! In-memory fakes for the backend, identity provider and clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{AuthBackend, LoginGrant, RefreshGrant};
use crate::clock::Clock;
use crate::error::{AuthError, StoreError};
use crate::identity::{IdentityProvider, IdentitySession};
use crate::store::{MemoryStore, SessionStore};
use crate::types::{Role, User};

pub const NOW_MS: i64 = 1_700_000_000_000;

pub fn admin_user() -> User {
    User { id: "admin-1".into(), username: "admin@example.com".into(), email: "admin@example.com".into(), role: Role::Admin }
}

pub fn editor_user() -> User {
    User { id: "editor-1".into(), username: "editor@example.com".into(), email: "editor@example.com".into(), role: Role::User }
}

// =============================================================================
// CLOCK
// =============================================================================

pub struct FixedClock(pub AtomicI64);

impl FixedClock {
    pub fn new(now_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_ms)))
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Memory store whose reads or writes can be made to fail.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub removes: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn io_error() -> StoreError {
        StoreError::Io(std::io::Error::other("disk unavailable"))
    }
}

impl SessionStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::io_error());
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(Self::io_error());
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key)
    }
}

// =============================================================================
// BACKEND
// =============================================================================

#[derive(Default)]
struct BackendState {
    /// username -> (password, user)
    accounts: HashMap<String, (String, User)>,
    /// outstanding custom tokens -> user
    custom_tokens: HashMap<String, User>,
    /// valid session tokens -> user
    sessions: HashMap<String, User>,
    /// valid backend refresh tokens -> user
    refresh_tokens: HashMap<String, User>,
    issued: usize,
}

impl BackendState {
    fn next(&mut self, prefix: &str) -> String {
        self.issued += 1;
        format!("{prefix}-{}", self.issued)
    }
}

/// Scriptable backend. `offline` turns every call into a network error.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    pub offline: AtomicBool,
    pub omit_exchange_token: AtomicBool,
    pub profile_fails: AtomicBool,
    pub verify_fails: AtomicBool,
    pub issue_refresh_tokens: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.add_account("admin@example.com", "admin-pass", admin_user());
        backend.add_account("editor@example.com", "editor-pass", editor_user());
        backend.issue_refresh_tokens.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn add_account(&self, username: &str, password: &str, user: User) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(username.to_owned(), (password.to_owned(), user));
    }

    pub fn add_session(&self, token: &str, user: User) {
        self.state.lock().unwrap().sessions.insert(token.to_owned(), user);
    }

    pub fn add_refresh_token(&self, token: &str, user: User) {
        self.state.lock().unwrap().refresh_tokens.insert(token.to_owned(), user);
    }

    pub fn expire_session(&self, token: &str) {
        self.state.lock().unwrap().sessions.remove(token);
    }

    pub fn is_session_valid(&self, token: &str) -> bool {
        self.state.lock().unwrap().sessions.contains_key(token)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn redeem_custom_token(&self, token: &str) -> Option<User> {
        self.state.lock().unwrap().custom_tokens.remove(token)
    }

    fn issue_session(&self, user: User) -> String {
        let mut state = self.state.lock().unwrap();
        let token = state.next("session");
        state.sessions.insert(token.clone(), user);
        token
    }

    fn unauthorized() -> AuthError {
        AuthError::BackendRejected { status: 401, message: "Invalid or expired session".into() }
    }
}

#[async_trait::async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        self.begin()?;
        let mut state = self.state.lock().unwrap();
        let user = match state.accounts.get(username) {
            Some((expected, user)) if expected == password => user.clone(),
            _ => return Err(AuthError::BackendRejected { status: 401, message: "Invalid credentials".into() }),
        };
        if self.omit_exchange_token.load(Ordering::SeqCst) {
            return Err(AuthError::MissingExchangeToken);
        }
        let exchange_token = state.next("custom");
        state.custom_tokens.insert(exchange_token.clone(), user.clone());
        let refresh_token = if self.issue_refresh_tokens.load(Ordering::SeqCst) {
            let token = state.next("refresh");
            state.refresh_tokens.insert(token.clone(), user.clone());
            Some(token)
        } else {
            None
        };
        Ok(LoginGrant { exchange_token, user, refresh_token })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, AuthError> {
        self.begin()?;
        let mut state = self.state.lock().unwrap();
        let Some(user) = state.refresh_tokens.remove(refresh_token) else {
            return Err(AuthError::BackendRejected { status: 401, message: "Invalid refresh token".into() });
        };
        let token = state.next("session");
        state.sessions.insert(token.clone(), user.clone());
        let rotated = state.next("refresh");
        state.refresh_tokens.insert(rotated.clone(), user);
        Ok(RefreshGrant { token, refresh_token: Some(rotated) })
    }

    async fn verify(&self, session_token: &str) -> Result<User, AuthError> {
        self.begin()?;
        if self.verify_fails.load(Ordering::SeqCst) {
            return Err(Self::unauthorized());
        }
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(session_token)
            .cloned()
            .ok_or_else(Self::unauthorized)
    }

    async fn profile(&self, session_token: &str) -> Result<User, AuthError> {
        self.begin()?;
        if self.profile_fails.load(Ordering::SeqCst) {
            return Err(AuthError::BackendRejected { status: 500, message: "boom".into() });
        }
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(session_token)
            .cloned()
            .ok_or_else(Self::unauthorized)
    }

    async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.begin()?;
        self.state.lock().unwrap().sessions.remove(session_token);
        Ok(())
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Identity provider whose ID tokens are sessions on the paired [`FakeBackend`].
pub struct FakeIdentity {
    backend: Arc<FakeBackend>,
    current: Mutex<Option<(IdentitySession, User)>>,
    pub fail_exchange: AtomicBool,
    pub fail_refresh: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub sign_outs: AtomicUsize,
}

impl FakeIdentity {
    pub fn new(backend: Arc<FakeBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            current: Mutex::new(None),
            fail_exchange: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            sign_outs: AtomicUsize::new(0),
        })
    }

    /// Install a live session for `user` without going through login.
    pub fn adopt_session(&self, user: User) -> IdentitySession {
        let id_token = self.backend.issue_session(user.clone());
        let session = IdentitySession { id_token, refresh_token: "identity-refresh".into(), expires_at_ms: NOW_MS };
        *self.current.lock().unwrap() = Some((session.clone(), user));
        session
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FakeIdentity {
    async fn exchange_custom_token(&self, custom_token: &str) -> Result<IdentitySession, AuthError> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(AuthError::IdentityExchangeFailed("INVALID_CUSTOM_TOKEN".into()));
        }
        let user = self
            .backend
            .redeem_custom_token(custom_token)
            .ok_or_else(|| AuthError::IdentityExchangeFailed("INVALID_CUSTOM_TOKEN".into()))?;
        Ok(self.adopt_session(user))
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        let (session, user) = self.current.lock().unwrap().clone().ok_or(AuthError::NoSession)?;
        if !force_refresh {
            return Ok(session.id_token);
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::IdentityExchangeFailed("TOKEN_EXPIRED".into()));
        }
        Ok(self.adopt_session(user).id_token)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::Network("identity unreachable".into()));
        }
        Ok(())
    }

    fn current_session(&self) -> Option<IdentitySession> {
        self.current.lock().unwrap().as_ref().map(|(session, _)| session.clone())
    }
}
