//! Identity provider abstraction.
//!
//! The identity provider verifies credentials and issues and refreshes
//! tokens. This module provides:
//! - [`IdentityProvider`] - Trait the session manager drives
//! - [`AuthError`] / [`AuthErrorKind`] - Provider failures, classified
//! - [`CognitoClient`] - Hosted user-pool implementation over HTTPS

use async_trait::async_trait;
use thiserror::Error;

use crate::model::UserIdentity;
use crate::store::StoreError;
use crate::token::TokenSet;

mod cognito;
mod jwt;

pub use cognito::CognitoClient;

/// Classification of an identity-provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Wrong password or otherwise rejected credentials.
    NotAuthorized,
    /// No account exists for the given username.
    UserNotFound,
    /// The account exists but the confirmation step is incomplete.
    UserNotConfirmed,
    /// Sign-up for an email that is already registered.
    UsernameExists,
    /// Wrong confirmation code.
    CodeMismatch,
    /// Confirmation code no longer valid.
    ExpiredCode,
    /// Password does not meet the pool's policy.
    InvalidPassword,
    /// Request rejected as malformed.
    InvalidParameter,
    /// Rate limited by the provider.
    TooManyRequests,
    /// Provider-side failure or an unclassified error.
    Unavailable,
    /// The request never produced a provider response.
    Network,
    /// The provider response could not be understood.
    InvalidResponse,
    /// Local token storage failed.
    Storage,
    /// Any other provider error code.
    Other(String),
}

impl AuthErrorKind {
    /// Classify a provider error code such as `NotAuthorizedException`.
    ///
    /// Codes may carry a `prefix#` namespace, which is ignored.
    pub fn from_code(code: &str) -> Self {
        let code = code.rsplit('#').next().unwrap_or(code);
        match code {
            "NotAuthorizedException" => Self::NotAuthorized,
            "UserNotFoundException" => Self::UserNotFound,
            "UserNotConfirmedException" => Self::UserNotConfirmed,
            "UsernameExistsException" => Self::UsernameExists,
            "CodeMismatchException" => Self::CodeMismatch,
            "ExpiredCodeException" => Self::ExpiredCode,
            "InvalidPasswordException" => Self::InvalidPassword,
            "InvalidParameterException" => Self::InvalidParameter,
            "TooManyRequestsException" | "LimitExceededException" => Self::TooManyRequests,
            "UnknownError" | "InternalErrorException" | "ServiceUnavailable"
            | "InternalFailure" => Self::Unavailable,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the failure is transient and not the user's fault.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::Network | Self::TooManyRequests | Self::InvalidResponse
        )
    }
}

/// Error returned by an [`IdentityProvider`].
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        Self::new(AuthErrorKind::Storage, e.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(AuthErrorKind::Network, e.to_string())
    }
}

/// Result of a successful credential sign-in.
#[derive(Debug, Clone)]
pub struct SignInTokens {
    pub identity: UserIdentity,
    pub tokens: TokenSet,
}

/// Optional attributes attached to a sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpAttributes {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl SignUpAttributes {
    pub fn new(first_name: Option<String>, last_name: Option<String>) -> Self {
        Self {
            first_name,
            last_name,
        }
    }
}

/// Client for the hosted identity service.
///
/// Implementations own token persistence: a successful [`sign_in`] or
/// [`refresh_tokens`] stores tokens so that [`current_user`] can answer
/// without network access on the next start.
///
/// [`sign_in`]: IdentityProvider::sign_in
/// [`refresh_tokens`]: IdentityProvider::refresh_tokens
/// [`current_user`]: IdentityProvider::current_user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify credentials and obtain tokens.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInTokens, AuthError>;

    /// Register a new account. Triggers a confirmation email.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &SignUpAttributes,
    ) -> Result<(), AuthError>;

    /// Complete registration with the emailed code.
    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError>;

    /// Invalidate the current tokens with the provider.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Identity of the locally stored, still-valid session. No network.
    async fn current_user(&self) -> Result<Option<UserIdentity>, AuthError>;

    /// Renew tokens with the stored refresh token.
    ///
    /// Returns `Ok(None)` when the session cannot be renewed (no refresh
    /// token, or the provider rejected it).
    async fn refresh_tokens(&self) -> Result<Option<UserIdentity>, AuthError>;
}
