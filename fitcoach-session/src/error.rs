//! Error types surfaced to session consumers.

use thiserror::Error;

use crate::identity::{AuthError, AuthErrorKind};
use crate::profile::ProfileError;
use crate::store::StoreError;

pub const MSG_UNCONFIRMED: &str = "Please confirm your email address before signing in.";
pub const MSG_BAD_CREDENTIALS: &str = "Incorrect email or password.";
pub const MSG_UNAVAILABLE: &str =
    "Authentication service is temporarily unavailable. Please try again.";
pub const MSG_SIGN_IN_FALLBACK: &str = "Sign in failed";
pub const MSG_SIGN_UP_FALLBACK: &str = "Sign up failed";
pub const MSG_CONFIRM_FALLBACK: &str = "Confirmation failed";
pub const MSG_SIGN_OUT_FALLBACK: &str = "Sign out failed";
pub const MSG_UNAUTHENTICATED: &str = "User not authenticated";

/// User-facing classification of a failed sign-in.
///
/// Unknown accounts and wrong passwords both map to
/// [`BadCredentials`](SignInFailure::BadCredentials), so the message never
/// reveals whether an account exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignInFailure {
    #[error("{}", MSG_UNCONFIRMED)]
    Unconfirmed,

    #[error("{}", MSG_BAD_CREDENTIALS)]
    BadCredentials,

    #[error("{}", MSG_UNAVAILABLE)]
    Unavailable,

    #[error("{0}")]
    Provider(String),
}

impl SignInFailure {
    /// Map a provider error onto the user-facing taxonomy.
    pub fn from_auth_error(error: &AuthError) -> Self {
        match &error.kind {
            AuthErrorKind::UserNotConfirmed => Self::Unconfirmed,
            AuthErrorKind::NotAuthorized | AuthErrorKind::UserNotFound => Self::BadCredentials,
            kind if kind.is_transient() => Self::Unavailable,
            _ => Self::Provider(message_or(&error.message, MSG_SIGN_IN_FALLBACK)),
        }
    }
}

/// Provider message, or `fallback` when the provider gave none.
pub(crate) fn message_or(message: &str, fallback: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Error returned by [`SessionManager`](crate::SessionManager) actions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sign-in was rejected.
    #[error(transparent)]
    SignIn(#[from] SignInFailure),

    /// Sign-up was rejected.
    #[error("{message}")]
    SignUp { message: String },

    /// Confirmation was rejected.
    #[error("{message}")]
    Confirm { message: String },

    /// The provider sign-out call failed. Local state was still cleared.
    #[error("{message}")]
    SignOut { message: String },

    /// The action needs a signed-in user.
    #[error("{}", MSG_UNAUTHENTICATED)]
    Unauthenticated,

    /// The profile backend rejected the request.
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Local storage failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Top-level error type encompassing all crate errors.
#[derive(Debug, Error)]
pub enum FitcoachError {
    /// Error from a session action.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error from the identity provider.
    #[error("identity provider error: {0}")]
    Auth(#[from] AuthError),

    /// Error from key-value storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
