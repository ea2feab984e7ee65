//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{Duration as ChronoDuration, Utc};
use fitcoach_session::{
    AuthError, AuthErrorKind, IdentityProvider, MemoryStore, Profile, ProfileApi, ProfileError,
    ProfileLookup, ProfileUpdate, SessionManager, SignInTokens, SignUpAttributes, TokenSet,
    UserId, UserIdentity,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(45 * 60);

/// Build an unsigned JWT carrying `claims`.
pub fn id_token(claims: serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.signature", header, payload)
}

pub fn identity(user_id: &str, email: &str) -> UserIdentity {
    UserIdentity::new(user_id, email)
}

pub fn profile(first_name: &str) -> Profile {
    Profile {
        first_name: Some(first_name.to_string()),
        ..Profile::default()
    }
}

/// Scriptable in-memory identity provider.
#[derive(Default)]
pub struct FakeIdentity {
    accounts: Mutex<HashMap<String, (String, UserIdentity)>>,
    current: Mutex<Option<UserIdentity>>,
    sign_in_error: Mutex<Option<AuthError>>,
    sign_in_delay: Mutex<Duration>,
    sign_out_error: Mutex<Option<AuthError>>,
    sign_up_error: Mutex<Option<AuthError>>,
    confirm_error: Mutex<Option<AuthError>>,
    refresh_script: Mutex<VecDeque<Result<Option<UserIdentity>, AuthError>>>,
    refresh_fallback: Mutex<Option<Result<Option<UserIdentity>, AuthError>>>,
    sign_ups: Mutex<Vec<(String, SignUpAttributes)>>,
    confirmations: Mutex<Vec<(String, String)>>,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_account(self: Arc<Self>, email: &str, password: &str, user_id: &str) -> Arc<Self> {
        self.accounts.lock().insert(
            email.to_string(),
            (password.to_string(), identity(user_id, email)),
        );
        self
    }

    pub fn set_current(&self, identity: Option<UserIdentity>) {
        *self.current.lock() = identity;
    }

    pub fn fail_sign_in(&self, error: AuthError) {
        *self.sign_in_error.lock() = Some(error);
    }

    pub fn delay_sign_in(&self, delay: Duration) {
        *self.sign_in_delay.lock() = delay;
    }

    pub fn fail_sign_out(&self, error: AuthError) {
        *self.sign_out_error.lock() = Some(error);
    }

    pub fn fail_sign_up(&self, error: AuthError) {
        *self.sign_up_error.lock() = Some(error);
    }

    pub fn fail_confirm(&self, error: AuthError) {
        *self.confirm_error.lock() = Some(error);
    }

    /// Queue one refresh outcome, consumed in order.
    pub fn push_refresh(&self, outcome: Result<Option<UserIdentity>, AuthError>) {
        self.refresh_script.lock().push_back(outcome);
    }

    /// Outcome for every refresh once the script is exhausted.
    pub fn refresh_always(&self, outcome: Result<Option<UserIdentity>, AuthError>) {
        *self.refresh_fallback.lock() = Some(outcome);
    }

    pub fn sign_ups(&self) -> Vec<(String, SignUpAttributes)> {
        self.sign_ups.lock().clone()
    }

    pub fn confirmations(&self) -> Vec<(String, String)> {
        self.confirmations.lock().clone()
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInTokens, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.sign_in_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.sign_in_error.lock().clone() {
            return Err(error);
        }

        let account = self.accounts.lock().get(email).cloned();
        match account {
            Some((expected, identity)) if expected == password => {
                *self.current.lock() = Some(identity.clone());
                let tokens = TokenSet::new("access", "id")
                    .with_refresh_token("refresh")
                    .with_expiry(Utc::now() + ChronoDuration::hours(1));
                Ok(SignInTokens { identity, tokens })
            }
            Some(_) => Err(AuthError::new(
                AuthErrorKind::NotAuthorized,
                "Incorrect username or password.",
            )),
            None => Err(AuthError::new(
                AuthErrorKind::UserNotFound,
                "User does not exist.",
            )),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        attributes: &SignUpAttributes,
    ) -> Result<(), AuthError> {
        if let Some(error) = self.sign_up_error.lock().clone() {
            return Err(error);
        }
        self.sign_ups
            .lock()
            .push((email.to_string(), attributes.clone()));
        Ok(())
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError> {
        if let Some(error) = self.confirm_error.lock().clone() {
            return Err(error);
        }
        self.confirmations
            .lock()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = None;
        match self.sign_out_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn current_user(&self) -> Result<Option<UserIdentity>, AuthError> {
        Ok(self.current.lock().clone())
    }

    async fn refresh_tokens(&self) -> Result<Option<UserIdentity>, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.refresh_script.lock().pop_front() {
            return outcome;
        }
        match self.refresh_fallback.lock().clone() {
            Some(outcome) => outcome,
            None => Ok(self.current.lock().clone()),
        }
    }
}

/// In-memory profile backend.
#[derive(Default)]
pub struct FakeProfiles {
    profile: Mutex<Option<Profile>>,
    get_error: Mutex<Option<u16>>,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FakeProfiles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_profile(self: Arc<Self>, profile: Profile) -> Arc<Self> {
        *self.profile.lock() = Some(profile);
        self
    }

    /// Make `get_profile` fail with the given HTTP status.
    pub fn fail_get(&self, status: u16) {
        *self.get_error.lock() = Some(status);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileApi for FakeProfiles {
    async fn get_profile(&self) -> Result<ProfileLookup, ProfileError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.get_error.lock() {
            return Err(ProfileError::Http {
                status,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(self.profile.lock().clone().into())
    }

    async fn update_profile(
        &self,
        update: &ProfileUpdate,
        user_id: &UserId,
    ) -> Result<Profile, ProfileError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.profile.lock();
        let mut profile = guard.clone().unwrap_or_default();
        for (key, value) in update.fields() {
            profile.extra.insert(key.clone(), value.clone());
        }
        profile
            .extra
            .insert("userId".to_string(), user_id.as_str().into());
        *guard = Some(profile.clone());
        Ok(profile)
    }
}

pub struct Harness {
    pub identity: Arc<FakeIdentity>,
    pub profiles: Arc<FakeProfiles>,
    pub store: Arc<MemoryStore>,
    pub manager: SessionManager,
}

pub fn harness(identity: Arc<FakeIdentity>, profiles: Arc<FakeProfiles>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(
        identity.clone(),
        profiles.clone(),
        store.clone(),
        REFRESH_INTERVAL,
    );
    Harness {
        identity,
        profiles,
        store,
        manager,
    }
}
