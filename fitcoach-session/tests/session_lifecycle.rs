//! Integration tests for the session lifecycle.
//!
//! These tests drive the SessionManager against fake collaborators and verify:
//! - Startup restore, silent refresh and the signed-out fallback
//! - Sign-in error mapping and state preservation on failure
//! - Sign-out clearing session, profile and the whole store
//! - Profile updates requiring a session
//! - The loading flag returning to false on every path

mod support;

use async_trait::async_trait;
use fitcoach_session::{
    AuthError, AuthErrorKind, AuthPhase, KeyValueStore, MemoryStore, ProfileUpdate, SessionError,
    SessionEvent, SessionManager, SignInFailure, StoreError,
};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeIdentity, FakeProfiles, REFRESH_INTERVAL, harness, identity, profile};

/// Store whose `clear` always fails.
#[derive(Default)]
struct UnclearableStore {
    inner: MemoryStore,
}

#[async_trait]
impl KeyValueStore for UnclearableStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove_item(key).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::BackendError {
            message: "disk full".to_string(),
        })
    }
}

#[tokio::test]
async fn test_cold_start_with_valid_session_and_profile() {
    let id = FakeIdentity::new();
    id.set_current(Some(identity("u-1", "a@b.com")));
    let h = harness(id, FakeProfiles::new().with_profile(profile("Ada")));

    assert_eq!(h.manager.snapshot().phase(), AuthPhase::Unknown);

    h.manager.check_auth_state().await;

    let state = h.manager.snapshot();
    assert!(!state.is_loading());
    assert_eq!(state.phase(), AuthPhase::Authenticated);
    assert_eq!(state.user().unwrap().user_id.as_str(), "u-1");
    assert_eq!(state.user().unwrap().email, "a@b.com");
    assert_eq!(state.profile().unwrap().first_name.as_deref(), Some("Ada"));
    assert_eq!(h.identity.refresh_calls(), 0, "valid local session needs no refresh");
}

#[tokio::test]
async fn test_cold_start_expired_session_refreshes_without_profile() {
    let id = FakeIdentity::new();
    id.push_refresh(Ok(Some(identity("u-2", "new@b.com"))));
    let h = harness(id, FakeProfiles::new());

    h.manager.check_auth_state().await;

    assert_eq!(h.identity.refresh_calls(), 1);
    let user = h.manager.user().expect("session restored by refresh");
    assert_eq!(user.user_id.as_str(), "u-2");
    assert!(h.manager.profile().is_none());
    assert!(!h.manager.is_loading());
}

#[tokio::test]
async fn test_profile_failure_does_not_block_session() {
    let id = FakeIdentity::new();
    id.set_current(Some(identity("u-1", "a@b.com")));
    let profiles = FakeProfiles::new().with_profile(profile("Ada"));
    profiles.fail_get(503);
    let h = harness(id, profiles);

    h.manager.check_auth_state().await;

    assert!(h.manager.is_authenticated());
    assert!(h.manager.profile().is_none());
    assert_eq!(h.profiles.get_calls(), 1);
}

#[tokio::test]
async fn test_cold_start_without_session_is_unauthenticated() {
    let id = FakeIdentity::new();
    id.refresh_always(Ok(None));
    let h = harness(id, FakeProfiles::new());

    h.manager.check_auth_state().await;

    let state = h.manager.snapshot();
    assert_eq!(state.phase(), AuthPhase::Unauthenticated);
    assert!(state.user().is_none());
    assert!(state.profile().is_none());
    assert!(!state.is_loading());
    assert_eq!(h.profiles.get_calls(), 0);
}

#[tokio::test]
async fn test_refresh_error_at_startup_degrades_to_signed_out() {
    let id = FakeIdentity::new();
    id.refresh_always(Err(AuthError::new(AuthErrorKind::Network, "dns failure")));
    let h = harness(id, FakeProfiles::new());

    h.manager.check_auth_state().await;

    assert_eq!(h.manager.snapshot().phase(), AuthPhase::Unauthenticated);
    assert!(!h.manager.refresh_armed());
}

#[tokio::test]
async fn test_sign_in_wrong_password() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new());

    let err = h.manager.sign_in("a@b.com", "wrong").await.unwrap_err();

    assert!(matches!(err, SessionError::SignIn(SignInFailure::BadCredentials)));
    assert_eq!(err.to_string(), "Incorrect email or password.");
    assert!(h.manager.user().is_none());
    assert!(!h.manager.is_loading());
}

#[tokio::test]
async fn test_sign_in_unknown_user_uses_same_message() {
    let h = harness(FakeIdentity::new(), FakeProfiles::new());

    let err = h.manager.sign_in("ghost@b.com", "whatever").await.unwrap_err();

    assert_eq!(err.to_string(), "Incorrect email or password.");
}

#[tokio::test]
async fn test_sign_in_unconfirmed_and_unavailable() {
    let id = FakeIdentity::new();
    id.fail_sign_in(AuthError::new(AuthErrorKind::UserNotConfirmed, "User is not confirmed."));
    let h = harness(id, FakeProfiles::new());

    let err = h.manager.sign_in("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::SignIn(SignInFailure::Unconfirmed)));

    h.identity.fail_sign_in(AuthError::new(AuthErrorKind::Unavailable, "stack trace here"));
    let err = h.manager.sign_in("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::SignIn(SignInFailure::Unavailable)));
    assert!(!err.to_string().contains("stack trace"));
}

#[tokio::test]
async fn test_sign_in_failure_keeps_existing_session() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new());
    h.manager.sign_in("a@b.com", "right").await.unwrap();
    let before = h.manager.user().unwrap();

    h.manager.sign_in("a@b.com", "wrong").await.unwrap_err();

    assert_eq!(h.manager.user(), Some(before));
}

#[tokio::test]
async fn test_sign_in_populates_session_and_profile() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new().with_profile(profile("Ada")));
    let mut events = h.manager.events();

    h.manager.sign_in("a@b.com", "right").await.unwrap();

    let state = h.manager.snapshot();
    assert_eq!(state.user().unwrap().user_id.as_str(), "u-1");
    assert_eq!(state.profile().unwrap().first_name.as_deref(), Some("Ada"));
    assert!(!state.is_loading());
    assert!(h.manager.refresh_armed());
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::SignedIn {
            user_id: "u-1".into()
        }
    );
}

#[tokio::test]
async fn test_sign_out_clears_everything() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new().with_profile(profile("Ada")));
    h.store.set_item("app.theme", "dark").await.unwrap();
    h.store.set_item("dashboard.cache", "{}").await.unwrap();
    h.manager.sign_in("a@b.com", "right").await.unwrap();
    assert!(h.manager.profile().is_some());

    h.manager.sign_out().await.unwrap();

    let state = h.manager.snapshot();
    assert!(state.user().is_none());
    assert!(state.profile().is_none());
    assert!(!state.is_loading());
    assert!(h.store.is_empty(), "sign-out wipes unrelated keys too");
    assert!(!h.manager.refresh_armed());
    assert_eq!(h.identity.sign_out_calls(), 1);
}

#[tokio::test]
async fn test_sign_out_provider_failure_still_clears_local_state() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new().with_profile(profile("Ada")));
    h.manager.sign_in("a@b.com", "right").await.unwrap();
    h.store.set_item("app.language", "fr").await.unwrap();
    h.identity
        .fail_sign_out(AuthError::new(AuthErrorKind::Network, "connection refused"));

    let err = h.manager.sign_out().await.unwrap_err();

    assert!(matches!(err, SessionError::SignOut { .. }));
    assert!(h.manager.user().is_none());
    assert!(h.manager.profile().is_none());
    assert!(h.store.is_empty());
    assert!(!h.manager.is_loading());
}

#[tokio::test]
async fn test_sign_out_store_failure_wins_over_provider_failure() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    id.fail_sign_out(AuthError::new(AuthErrorKind::Network, "connection refused"));
    let store = Arc::new(UnclearableStore::default());
    let manager = SessionManager::new(id, FakeProfiles::new(), store, REFRESH_INTERVAL);
    manager.sign_in("a@b.com", "right").await.unwrap();

    let err = manager.sign_out().await.unwrap_err();

    assert!(matches!(err, SessionError::Store(_)));
    assert!(manager.user().is_none());
    assert!(!manager.is_loading());
}

#[tokio::test]
async fn test_update_profile_requires_session() {
    let h = harness(FakeIdentity::new(), FakeProfiles::new());

    let err = h
        .manager
        .update_profile(ProfileUpdate::new().set("bio", "hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Unauthenticated));
    assert_eq!(err.to_string(), "User not authenticated");
    assert_eq!(h.profiles.update_calls(), 0);
    assert!(!h.manager.is_loading());
}

#[tokio::test]
async fn test_update_profile_replaces_local_profile_with_response() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new().with_profile(profile("Ada")));
    h.manager.sign_in("a@b.com", "right").await.unwrap();

    let updated = h
        .manager
        .update_profile(ProfileUpdate::new().set("bio", "hi"))
        .await
        .unwrap();

    assert_eq!(updated.extra.get("bio"), Some(&serde_json::json!("hi")));
    assert_eq!(updated.extra.get("userId"), Some(&serde_json::json!("u-1")));
    assert_eq!(h.manager.profile(), Some(updated));
}

#[tokio::test]
async fn test_sign_up_and_confirm_do_not_create_session() {
    let h = harness(FakeIdentity::new(), FakeProfiles::new());

    h.manager
        .sign_up("new@b.com", "pw", Some("Ada"), None)
        .await
        .unwrap();
    h.manager.confirm_sign_up("new@b.com", "123456").await.unwrap();

    assert!(h.manager.user().is_none());
    let sign_ups = h.identity.sign_ups();
    assert_eq!(sign_ups.len(), 1);
    assert_eq!(sign_ups[0].1.first_name.as_deref(), Some("Ada"));
    assert_eq!(sign_ups[0].1.last_name, None);
    assert_eq!(
        h.identity.confirmations(),
        vec![("new@b.com".to_string(), "123456".to_string())]
    );
}

#[tokio::test]
async fn test_sign_up_and_confirm_error_messages() {
    let id = FakeIdentity::new();
    id.fail_sign_up(AuthError::new(
        AuthErrorKind::UsernameExists,
        "An account with the given email already exists.",
    ));
    id.fail_confirm(AuthError::new(AuthErrorKind::CodeMismatch, ""));
    let h = harness(id, FakeProfiles::new());

    let err = h.manager.sign_up("a@b.com", "pw", None, None).await.unwrap_err();
    assert_eq!(err.to_string(), "An account with the given email already exists.");

    let err = h.manager.confirm_sign_up("a@b.com", "000").await.unwrap_err();
    assert_eq!(err.to_string(), "Confirmation failed");
    assert!(!h.manager.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_loading_flag_brackets_slow_sign_in() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    id.delay_sign_in(Duration::from_secs(5));
    let h = harness(id, FakeProfiles::new());
    assert!(!h.manager.is_loading());

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_in("a@b.com", "wrong").await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.manager.is_loading());
    assert!(h.manager.user().is_none());

    let result = pending.await.unwrap();
    assert!(result.is_err());
    assert!(!h.manager.is_loading());
}

#[tokio::test]
async fn test_every_published_state_derives_authenticated() {
    let id = FakeIdentity::new().with_account("a@b.com", "right", "u-1");
    let h = harness(id, FakeProfiles::new().with_profile(profile("Ada")));
    let mut rx = h.manager.subscribe();

    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let done = !state.is_loading() && state.phase() == AuthPhase::Unauthenticated;
            seen.push(state);
            if done {
                break;
            }
        }
        seen
    });

    h.manager.sign_in("a@b.com", "right").await.unwrap();
    h.manager.sign_out().await.unwrap();

    let seen = watcher.await.unwrap();
    assert!(!seen.is_empty());
    for state in &seen {
        assert_eq!(state.is_authenticated(), state.user().is_some());
        if state.profile().is_some() {
            assert!(state.user().is_some(), "profile never outlives the session");
        }
    }
}
