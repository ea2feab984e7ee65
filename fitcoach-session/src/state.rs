//! Observable session state.
//!
//! [`SessionState`] is published on a `watch` channel after every change;
//! [`SessionEvent`] is broadcast for transitions consumers may want to act
//! on, including the silent invalidation performed by the refresh loop.

use serde::Serialize;
use tokio::sync::watch;

use crate::model::{Profile, Session, UserId};

/// Where the session state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// No check has completed yet.
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the session as consumers see it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    user: Option<Session>,
    profile: Option<Profile>,
    checked: bool,
    #[serde(skip)]
    pending: usize,
}

impl SessionState {
    pub fn user(&self) -> Option<&Session> {
        self.user.as_ref()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// True iff a session is present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// True while at least one session operation is in flight.
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }

    pub fn phase(&self) -> AuthPhase {
        match (&self.user, self.checked) {
            (Some(_), _) => AuthPhase::Authenticated,
            (None, true) => AuthPhase::Unauthenticated,
            (None, false) => AuthPhase::Unknown,
        }
    }

    pub(crate) fn establish(&mut self, session: Session, profile: Option<Profile>) {
        self.user = Some(session);
        self.profile = profile;
        self.checked = true;
    }

    /// Drop session and profile together.
    pub(crate) fn clear(&mut self) {
        self.user = None;
        self.profile = None;
        self.checked = true;
    }

    /// Replace the profile. Ignored without a session.
    pub(crate) fn set_profile(&mut self, profile: Profile) {
        if self.user.is_some() {
            self.profile = Some(profile);
        }
    }
}

/// Session transitions broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A stored or silently refreshed session was picked up.
    Restored { user_id: UserId },
    /// A credential sign-in established a session.
    SignedIn { user_id: UserId },
    /// The user signed out; all local state was wiped.
    SignedOut { user_id: Option<UserId> },
    /// The background refresh could not renew the session.
    Invalidated { user_id: UserId },
    /// The profile was replaced by an update.
    ProfileUpdated { user_id: UserId },
}

/// Holds the loading flag up for as long as it lives.
///
/// Dropping the guard releases the flag on every exit path, including
/// errors and cancellation of the owning future.
pub(crate) struct LoadingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn enter(state: &'a watch::Sender<SessionState>) -> Self {
        state.send_modify(|s| s.pending += 1);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .send_modify(|s| s.pending = s.pending.saturating_sub(1));
    }
}
