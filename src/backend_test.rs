use super::*;
use crate::stub::StubBackend;
use crate::types::Role;

const USER_JSON: &str = r#"{"id":"u1","username":"admin","email":"admin@example.com","role":"admin"}"#;

// =============================================================================
// parse_login
// =============================================================================

#[test]
fn parse_login_nested_custom_token() {
    let body = format!(r#"{{"success":true,"data":{{"customToken":"ct","user":{USER_JSON},"refreshToken":"rt"}}}}"#);
    let grant = parse_login(200, &body).unwrap();
    assert_eq!(grant.exchange_token, "ct");
    assert_eq!(grant.user.role, Role::Admin);
    assert_eq!(grant.refresh_token.as_deref(), Some("rt"));
}

#[test]
fn parse_login_accepts_token_alias() {
    let body = format!(r#"{{"success":true,"data":{{"token":"ct","user":{USER_JSON}}}}}"#);
    let grant = parse_login(200, &body).unwrap();
    assert_eq!(grant.exchange_token, "ct");
    assert_eq!(grant.refresh_token, None);
}

#[test]
fn parse_login_success_without_token_is_missing_exchange_token() {
    let body = format!(r#"{{"success":true,"data":{{"user":{USER_JSON}}}}}"#);
    assert!(matches!(parse_login(200, &body), Err(AuthError::MissingExchangeToken)));
}

#[test]
fn parse_login_success_without_data_is_missing_exchange_token() {
    assert!(matches!(parse_login(200, r#"{"success":true}"#), Err(AuthError::MissingExchangeToken)));
}

#[test]
fn parse_login_empty_token_is_missing_exchange_token() {
    let body = format!(r#"{{"success":true,"data":{{"customToken":"","user":{USER_JSON}}}}}"#);
    assert!(matches!(parse_login(200, &body), Err(AuthError::MissingExchangeToken)));
}

#[test]
fn parse_login_success_false_is_rejected() {
    let err = parse_login(200, r#"{"success":false,"message":"Invalid credentials"}"#).unwrap_err();
    match err {
        AuthError::BackendRejected { status, message } => {
            assert_eq!(status, 200);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn parse_login_http_error_uses_body_message() {
    let err = parse_login(401, r#"{"success":false,"message":"nope"}"#).unwrap_err();
    assert!(matches!(err, AuthError::BackendRejected { status: 401, ref message } if message == "nope"));
}

#[test]
fn parse_login_http_error_plain_text_body() {
    let err = parse_login(502, "Bad Gateway").unwrap_err();
    assert!(matches!(err, AuthError::BackendRejected { status: 502, ref message } if message == "Bad Gateway"));
}

#[test]
fn parse_login_garbage_body_is_invalid_response() {
    assert!(matches!(parse_login(200, "<html>"), Err(AuthError::InvalidResponse(_))));
}

// =============================================================================
// parse_refresh / parse_user / parse_logout
// =============================================================================

#[test]
fn parse_refresh_with_rotation() {
    let grant = parse_refresh(200, r#"{"success":true,"token":"t2","refreshToken":"r2"}"#).unwrap();
    assert_eq!(grant, RefreshGrant { token: "t2".into(), refresh_token: Some("r2".into()) });
}

#[test]
fn parse_refresh_missing_token_is_invalid() {
    assert!(matches!(parse_refresh(200, r#"{"success":true}"#), Err(AuthError::InvalidResponse(_))));
}

#[test]
fn parse_user_success() {
    let user = parse_user(200, &format!(r#"{{"success":true,"user":{USER_JSON}}}"#)).unwrap();
    assert_eq!(user.id, "u1");
}

#[test]
fn parse_user_unauthorized() {
    assert!(matches!(parse_user(401, ""), Err(AuthError::BackendRejected { status: 401, .. })));
}

#[test]
fn parse_logout_treats_401_as_success() {
    assert!(parse_logout(401, "").is_ok());
}

#[test]
fn parse_logout_success_false_is_rejected() {
    assert!(parse_logout(200, r#"{"success":false}"#).is_err());
    assert!(parse_logout(500, "").is_err());
    assert!(parse_logout(200, r#"{"success":true}"#).is_ok());
}

// =============================================================================
// HttpBackend against the stub
// =============================================================================

async fn backend() -> (StubBackend, HttpBackend) {
    let stub = StubBackend::default();
    let addr = stub.spawn_local().await.unwrap();
    let backend = HttpBackend::new(format!("http://{addr}/"), HttpTimeouts::default()).unwrap();
    (stub, backend)
}

#[tokio::test]
async fn http_login_returns_grant() {
    let (_stub, backend) = backend().await;
    let grant = backend.login("admin@example.com", "admin-pass").await.unwrap();
    assert_eq!(grant.user.username, "admin");
    assert!(!grant.exchange_token.is_empty());
    assert!(grant.refresh_token.is_some());
}

#[tokio::test]
async fn http_login_bad_credentials_is_rejected() {
    let (_stub, backend) = backend().await;
    let err = backend.login("admin@example.com", "nope").await.unwrap_err();
    assert!(matches!(err, AuthError::BackendRejected { status: 401, .. }));
}

#[tokio::test]
async fn http_refresh_rotates_token() {
    let (stub, backend) = backend().await;
    let grant = backend.login("admin", "admin-pass").await.unwrap();
    let refresh = grant.refresh_token.unwrap();
    let refreshed = backend.refresh(&refresh).await.unwrap();
    assert!(stub.is_session_valid(&refreshed.token));
    let rotated = refreshed.refresh_token.unwrap();
    assert_ne!(rotated, refresh);
    // the old refresh token is spent
    assert!(backend.refresh(&refresh).await.is_err());
}

#[tokio::test]
async fn http_verify_and_profile_with_unknown_token_fail() {
    let (_stub, backend) = backend().await;
    assert!(matches!(backend.verify("nope").await, Err(AuthError::BackendRejected { status: 401, .. })));
    assert!(backend.profile("nope").await.is_err());
}

#[tokio::test]
async fn http_logout_with_unknown_token_succeeds() {
    let (_stub, backend) = backend().await;
    backend.logout("nope").await.unwrap();
}

#[tokio::test]
async fn http_unreachable_backend_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let backend = HttpBackend::new(format!("http://{addr}"), HttpTimeouts::default()).unwrap();
    assert!(matches!(backend.login("a", "b").await, Err(AuthError::Network(_))));
}

#[test]
fn base_url_is_trimmed() {
    let backend = HttpBackend::new("http://shop.test/", HttpTimeouts::default()).unwrap();
    assert_eq!(backend.base_url(), "http://shop.test");
    assert_eq!(backend.url(VERIFY_PATH), "http://shop.test/api/auth/verify");
}
