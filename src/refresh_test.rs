use std::sync::atomic::Ordering;

use super::*;
use crate::store::{KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN, MemoryStore, SessionStore};
use crate::test_helpers::{FakeBackend, FakeIdentity, admin_user};

struct Harness {
    backend: Arc<FakeBackend>,
    identity: Arc<FakeIdentity>,
    store: Arc<MemoryStore>,
    client: TokenRefreshClient,
}

fn harness() -> Harness {
    let backend = FakeBackend::new();
    let identity = FakeIdentity::new(backend.clone());
    let store = Arc::new(MemoryStore::new());
    let client = TokenRefreshClient::new(backend.clone(), identity.clone(), SessionVault::new(store.clone()));
    Harness { backend, identity, store, client }
}

#[tokio::test]
async fn refresh_prefers_live_identity_session() {
    let h = harness();
    let session = h.identity.adopt_session(admin_user());
    h.store.set(KEY_REFRESH_TOKEN, "backend-refresh").unwrap();

    let token = h.client.refresh().await.unwrap();
    assert_ne!(token, session.id_token);
    assert_eq!(h.store.get(KEY_AUTH_TOKEN).unwrap().as_deref(), Some(token.as_str()));
    assert_eq!(h.backend.call_count(), 0);
    // the backend refresh token is untouched
    assert_eq!(h.store.get(KEY_REFRESH_TOKEN).unwrap().as_deref(), Some("backend-refresh"));
}

#[tokio::test]
async fn refresh_identity_failure_does_not_fall_back_to_backend() {
    let h = harness();
    h.identity.adopt_session(admin_user());
    h.identity.fail_refresh.store(true, Ordering::SeqCst);
    h.backend.add_refresh_token("backend-refresh", admin_user());
    h.store.set(KEY_REFRESH_TOKEN, "backend-refresh").unwrap();

    assert!(h.client.refresh().await.is_err());
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn refresh_uses_backend_refresh_token_and_rotates() {
    let h = harness();
    h.backend.add_refresh_token("refresh-0", admin_user());
    h.store.set(KEY_REFRESH_TOKEN, "refresh-0").unwrap();

    let token = h.client.refresh().await.unwrap();
    assert!(h.backend.is_session_valid(&token));
    assert_eq!(h.store.get(KEY_AUTH_TOKEN).unwrap().as_deref(), Some(token.as_str()));
    let rotated = h.store.get(KEY_REFRESH_TOKEN).unwrap().unwrap();
    assert_ne!(rotated, "refresh-0");
}

#[tokio::test]
async fn refresh_without_any_source_is_no_refresh_token_available() {
    let h = harness();
    assert!(matches!(h.client.refresh().await, Err(AuthError::NoRefreshTokenAvailable)));
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn refresh_backend_rejection_is_an_error_value() {
    let h = harness();
    h.store.set(KEY_REFRESH_TOKEN, "unknown").unwrap();
    assert!(matches!(h.client.refresh().await, Err(AuthError::BackendRejected { status: 401, .. })));
    assert!(h.store.get(KEY_AUTH_TOKEN).unwrap().is_none());
}

#[tokio::test]
async fn refresh_network_failure_is_an_error_value() {
    let h = harness();
    h.store.set(KEY_REFRESH_TOKEN, "refresh-0").unwrap();
    h.backend.set_offline(true);
    assert!(matches!(h.client.refresh().await, Err(AuthError::Network(_))));
}
