use super::*;

fn admin() -> User {
    User { id: "u-1".into(), username: "admin".into(), email: "admin@example.com".into(), role: Role::Admin }
}

// =============================================================================
// AuthState
// =============================================================================

#[test]
fn default_state_is_loading_and_unauthenticated() {
    let state = AuthState::default();
    assert_eq!(state.phase, AuthPhase::Uninitialized);
    assert!(state.is_loading());
    assert!(!state.is_authenticated());
    assert!(state.user().is_none());
}

#[test]
fn authenticated_state_exposes_user() {
    let state = AuthState::authenticated(admin());
    assert!(state.is_authenticated());
    assert!(!state.is_loading());
    assert_eq!(state.user().map(|u| u.id.as_str()), Some("u-1"));
}

#[test]
fn unauthenticated_state_has_no_user() {
    let state = AuthState::unauthenticated();
    assert!(!state.is_authenticated());
    assert!(!state.is_loading());
}

#[test]
fn loading_state_is_not_authenticated() {
    let state = AuthState::loading();
    assert!(state.is_loading());
    assert!(!state.is_authenticated());
}

// =============================================================================
// User / Role serde
// =============================================================================

#[test]
fn role_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
}

#[test]
fn user_deserializes_from_backend_json() {
    let json = r#"{"id":"42","username":"sam","email":"sam@example.com","role":"user"}"#;
    let user: User = serde_json::from_str(json).unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.role, Role::User);
    assert!(!user.is_admin());
}

#[test]
fn user_rejects_unknown_role() {
    let json = r#"{"id":"42","username":"sam","email":"sam@example.com","role":"owner"}"#;
    assert!(serde_json::from_str::<User>(json).is_err());
}

// =============================================================================
// AuthOutcome
// =============================================================================

#[test]
fn outcome_ok_omits_message() {
    let json = serde_json::to_value(AuthOutcome::ok()).unwrap();
    assert_eq!(json, serde_json::json!({ "success": true }));
}

#[test]
fn outcome_failed_carries_message() {
    let outcome = AuthOutcome::failed("nope");
    assert!(!outcome.success);
    assert_eq!(outcome.message.as_deref(), Some("nope"));
}
