//! The session manager.
//!
//! [`SessionManager`] is the single source of truth for who is signed in.
//! It orchestrates the identity provider, the profile API and the shared
//! key-value store, publishes state on a `watch` channel and keeps tokens
//! fresh with a background refresh loop while a user is signed in.
//!
//! # Ordering
//!
//! Every session-affecting operation, background refresh ticks included,
//! runs under one async mutex, so operations apply in arrival order. The
//! loading flag is raised before the mutex is awaited, so a queued operation
//! already reports `is_loading() == true`.
//!
//! # Example
//!
//! ```rust,ignore
//! use fitcoach_session::{SessionConfig, SessionManager, MemoryStore};
//! use std::sync::Arc;
//!
//! let manager = SessionManager::from_config(&config, Arc::new(MemoryStore::new()))?;
//! manager.check_auth_state().await;
//! if !manager.is_authenticated() {
//!     manager.sign_in("a@b.com", "correct horse").await?;
//! }
//! println!("hello {}", manager.user().unwrap().email);
//! ```

use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};

use crate::config::SessionConfig;
use crate::error::{
    FitcoachError, MSG_CONFIRM_FALLBACK, MSG_SIGN_OUT_FALLBACK, MSG_SIGN_UP_FALLBACK,
    SessionError, SignInFailure, message_or,
};
use crate::identity::{CognitoClient, IdentityProvider, SignUpAttributes};
use crate::model::{Profile, ProfileUpdate, Session, UserId, UserIdentity};
use crate::profile::{HttpProfileApi, ProfileApi};
use crate::refresh::RefreshTask;
use crate::state::{LoadingGuard, SessionEvent, SessionState};
use crate::store::KeyValueStore;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// What triggered a session check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOrigin {
    Restore,
    SignIn,
}

/// Shared state behind every [`SessionManager`] handle.
pub(crate) struct Inner {
    pub(crate) identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileApi>,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    /// Serializes session-affecting operations.
    pub(crate) ops: Mutex<()>,
    /// Bumped whenever the session identity is established or cleared.
    pub(crate) generation: AtomicU64,
    pub(crate) refresh_interval: Duration,
    pub(crate) refresh: SyncMutex<Option<RefreshTask>>,
}

/// Handle to the client-side authentication session.
///
/// Cloning is cheap; all clones share the same session. When the last
/// handle is dropped the background refresh task is cancelled.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager from explicit collaborators.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileApi>,
        store: Arc<dyn KeyValueStore>,
        refresh_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                identity,
                profiles,
                store,
                state,
                events,
                ops: Mutex::new(()),
                generation: AtomicU64::new(0),
                refresh_interval,
                refresh: SyncMutex::new(None),
            }),
        }
    }

    /// Create a manager talking to the configured user pool and REST API.
    ///
    /// Tokens and all other client state are kept in `store`.
    pub fn from_config(
        config: &SessionConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, FitcoachError> {
        config.validate()?;

        let identity =
            CognitoClient::new(&config.identity, config.request_timeout(), store.clone())?;
        let profiles =
            HttpProfileApi::new(&config.api_base_url, config.request_timeout(), store.clone())?;

        Ok(Self::new(
            Arc::new(identity),
            Arc::new(profiles),
            store,
            config.refresh_interval(),
        ))
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn user(&self) -> Option<Session> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.state.borrow().profile().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading()
    }

    /// Pick up a stored session, or renew it silently.
    ///
    /// Never fails: provider or network errors leave the manager signed out.
    /// A missing or unreachable profile leaves the profile empty without
    /// affecting the session.
    pub async fn check_auth_state(&self) {
        let _loading = LoadingGuard::enter(&self.inner.state);
        let _op = self.inner.ops.lock().await;
        self.inner.check_auth_state_locked(CheckOrigin::Restore).await;
    }

    /// Re-run [`check_auth_state`](Self::check_auth_state), e.g. after a
    /// failed profile load.
    pub async fn refresh_user(&self) {
        self.check_auth_state().await
    }

    /// Sign in with email and password.
    ///
    /// On success the session and profile are loaded the same way as
    /// [`check_auth_state`](Self::check_auth_state) does. On failure the
    /// current state is left untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let _loading = LoadingGuard::enter(&self.inner.state);
        let _op = self.inner.ops.lock().await;

        match self.inner.identity.sign_in(email, password).await {
            Ok(signed_in) => {
                tracing::debug!(user_id = %signed_in.identity.user_id, "credentials accepted");
                self.inner.check_auth_state_locked(CheckOrigin::SignIn).await;
                Ok(())
            }
            Err(e) => {
                let failure = SignInFailure::from_auth_error(&e);
                if failure == SignInFailure::Unavailable {
                    tracing::error!(kind = ?e.kind, error = %e.message, "sign-in failed at provider");
                } else {
                    tracing::info!(kind = ?e.kind, "sign-in rejected");
                }
                Err(failure.into())
            }
        }
    }

    /// Register a new account. No session is created; the account must be
    /// confirmed and then signed in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<(), SessionError> {
        let _loading = LoadingGuard::enter(&self.inner.state);
        let _op = self.inner.ops.lock().await;

        let attributes =
            SignUpAttributes::new(first_name.map(str::to_string), last_name.map(str::to_string));

        self.inner
            .identity
            .sign_up(email, password, &attributes)
            .await
            .map_err(|e| {
                tracing::info!(kind = ?e.kind, "sign-up rejected");
                SessionError::SignUp {
                    message: message_or(&e.message, MSG_SIGN_UP_FALLBACK),
                }
            })
    }

    /// Confirm a registration with the emailed code. No session is created.
    pub async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), SessionError> {
        let _loading = LoadingGuard::enter(&self.inner.state);
        let _op = self.inner.ops.lock().await;

        self.inner
            .identity
            .confirm_sign_up(email, code)
            .await
            .map_err(|e| {
                tracing::info!(kind = ?e.kind, "confirmation rejected");
                SessionError::Confirm {
                    message: message_or(&e.message, MSG_CONFIRM_FALLBACK),
                }
            })
    }

    /// Sign out and wipe all local state.
    ///
    /// Session, profile and the whole key-value store are cleared even when
    /// the provider call fails; the provider error is returned afterwards.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let _loading = LoadingGuard::enter(&self.inner.state);
        let _op = self.inner.ops.lock().await;

        let provider_result = self.inner.identity.sign_out().await;
        if let Err(e) = &provider_result {
            tracing::warn!(kind = ?e.kind, error = %e.message, "provider sign-out failed, clearing local state anyway");
        }

        let user_id = self.inner.clear_session();
        let store_result = self.inner.store.clear().await;
        self.inner.emit(SessionEvent::SignedOut {
            user_id: user_id.clone(),
        });

        match &user_id {
            Some(user_id) => tracing::info!(%user_id, "signed out"),
            None => tracing::info!("signed out without an active session"),
        }

        if let Err(store_error) = store_result {
            if let Err(e) = &provider_result {
                tracing::error!(
                    kind = ?e.kind,
                    error = %e.message,
                    "provider sign-out also failed; reporting the store error"
                );
            }
            return Err(store_error.into());
        }
        provider_result.map_err(|e| SessionError::SignOut {
            message: message_or(&e.message, MSG_SIGN_OUT_FALLBACK),
        })
    }

    /// Apply a partial profile update for the signed-in user.
    ///
    /// The backend's response replaces the local profile.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, SessionError> {
        let _loading = LoadingGuard::enter(&self.inner.state);
        let _op = self.inner.ops.lock().await;

        let user_id = self
            .inner
            .state
            .borrow()
            .user()
            .map(|session| session.user_id.clone());
        let Some(user_id) = user_id else {
            return Err(SessionError::Unauthenticated);
        };

        let profile = self
            .inner
            .profiles
            .update_profile(&update, &user_id)
            .await?;

        let stored = profile.clone();
        self.inner.state.send_modify(|s| s.set_profile(stored));
        self.inner.emit(SessionEvent::ProfileUpdated {
            user_id: user_id.clone(),
        });
        tracing::debug!(%user_id, fields = update.len(), "profile updated");

        Ok(profile)
    }

    /// Cancel the background refresh task.
    ///
    /// The session itself is left as is; the next establishment re-arms it.
    pub fn shutdown(&self) {
        self.inner.disarm_refresh();
    }

    /// Whether a background refresh task is currently armed.
    pub fn refresh_armed(&self) -> bool {
        self.inner
            .refresh
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.inner.state.borrow())
            .field("refresh_interval", &self.inner.refresh_interval)
            .finish()
    }
}

impl Inner {
    /// Body of `check_auth_state`. Caller holds `ops`.
    async fn check_auth_state_locked(self: &Arc<Self>, origin: CheckOrigin) {
        let local = match self.identity.current_user().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(kind = ?e.kind, error = %e.message, "failed to read local session");
                None
            }
        };

        let identity = match local {
            Some(identity) => Some(identity),
            None => match self.identity.refresh_tokens().await {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(kind = ?e.kind, error = %e.message, "silent refresh failed");
                    None
                }
            },
        };

        match identity {
            Some(identity) => {
                let profile = self.fetch_profile().await;
                self.establish(identity, profile, origin);
            }
            None => {
                if let Some(user_id) = self.clear_session() {
                    tracing::info!(%user_id, "stored session is no longer valid");
                } else {
                    tracing::debug!("no stored session");
                }
            }
        }
    }

    /// Best-effort profile load.
    async fn fetch_profile(&self) -> Option<Profile> {
        match self.profiles.get_profile().await {
            Ok(lookup) => lookup.into_option(),
            Err(e) => {
                tracing::warn!(error = %e, "profile fetch failed, continuing without profile");
                None
            }
        }
    }

    /// Publish a session for `identity`, keeping the existing session record
    /// when the identity is unchanged.
    fn establish(
        self: &Arc<Self>,
        identity: UserIdentity,
        profile: Option<Profile>,
        origin: CheckOrigin,
    ) {
        let user_id = identity.user_id.clone();
        let mut changed = false;

        self.state.send_modify(|s| {
            let session = match s.user() {
                Some(current) if current.user_id == identity.user_id => {
                    let mut session = current.clone();
                    session.email = identity.email;
                    session
                }
                _ => {
                    changed = true;
                    Session::establish(identity)
                }
            };
            s.establish(session, profile);
        });

        if changed {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        let generation = self.generation.load(Ordering::SeqCst);

        match origin {
            CheckOrigin::SignIn => {
                tracing::info!(%user_id, "signed in");
                self.emit(SessionEvent::SignedIn {
                    user_id: user_id.clone(),
                });
            }
            CheckOrigin::Restore if changed => {
                tracing::info!(%user_id, "session restored");
                self.emit(SessionEvent::Restored {
                    user_id: user_id.clone(),
                });
            }
            CheckOrigin::Restore => {}
        }

        self.arm_refresh(&user_id, generation);
    }

    /// Drop session and profile and stop the refresh loop.
    ///
    /// Returns the identity that was signed in, if any.
    pub(crate) fn clear_session(&self) -> Option<UserId> {
        let mut previous = None;
        self.state.send_modify(|s| {
            previous = s.user().map(|session| session.user_id.clone());
            s.clear();
        });

        if previous.is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.disarm_refresh();
        previous
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.disarm_refresh();
    }
}
