//! Identity-provider tokens and their persistence.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`TokenSet`] - The access/refresh/id token triple issued on sign-in
//! - [`TokenVault`] - Typed token persistence on top of a [`KeyValueStore`]
//!
//! # Storage Key Convention
//!
//! Tokens are stored under `auth.accessToken`, `auth.refreshToken`,
//! `auth.idToken` and `auth.expiresAt` (unix seconds).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::store::{KeyValueStore, StoreError};

pub const ACCESS_TOKEN_KEY: &str = "auth.accessToken";
pub const REFRESH_TOKEN_KEY: &str = "auth.refreshToken";
pub const ID_TOKEN_KEY: &str = "auth.idToken";
pub const EXPIRES_AT_KEY: &str = "auth.expiresAt";

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Tokens issued by the identity provider for one signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token for API calls.
    pub access_token: Secret,

    /// Long-lived token used for silent refresh (if issued).
    pub refresh_token: Option<Secret>,

    /// JWT carrying the user's identity claims.
    pub id_token: Secret,

    /// When the access token expires (None if unknown).
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Create a token set from an access and id token.
    pub fn new(access_token: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: None,
            id_token: Secret::new(id_token),
            expires_at: None,
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }

    /// Attach an expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if the access token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Check if the access token will expire within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }
}

/// Persists a [`TokenSet`] in a shared [`KeyValueStore`].
#[derive(Clone)]
pub struct TokenVault {
    store: Arc<dyn KeyValueStore>,
}

impl TokenVault {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the stored token set.
    ///
    /// Returns `None` unless both the access and id token are present.
    pub async fn load(&self) -> Result<Option<TokenSet>, StoreError> {
        let Some(access) = self.store.get_item(ACCESS_TOKEN_KEY).await? else {
            return Ok(None);
        };
        let Some(id) = self.store.get_item(ID_TOKEN_KEY).await? else {
            return Ok(None);
        };

        let mut tokens = TokenSet::new(access, id);

        if let Some(refresh) = self.store.get_item(REFRESH_TOKEN_KEY).await? {
            tokens = tokens.with_refresh_token(refresh);
        }

        if let Some(expiry) = self.store.get_item(EXPIRES_AT_KEY).await? {
            if let Some(expires_at) = expiry
                .parse::<i64>()
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
            {
                tokens = tokens.with_expiry(expires_at);
            }
        }

        Ok(Some(tokens))
    }

    /// Load only the refresh token.
    pub async fn refresh_token(&self) -> Result<Option<Secret>, StoreError> {
        Ok(self.store.get_item(REFRESH_TOKEN_KEY).await?.map(Secret::new))
    }

    /// Load only the access token.
    pub async fn access_token(&self) -> Result<Option<Secret>, StoreError> {
        Ok(self.store.get_item(ACCESS_TOKEN_KEY).await?.map(Secret::new))
    }

    /// Store a token set.
    ///
    /// A missing refresh token leaves any previously stored one in place,
    /// since refresh responses do not reissue it.
    pub async fn save(&self, tokens: &TokenSet) -> Result<(), StoreError> {
        self.store
            .set_item(ACCESS_TOKEN_KEY, tokens.access_token.expose())
            .await?;
        self.store
            .set_item(ID_TOKEN_KEY, tokens.id_token.expose())
            .await?;

        if let Some(refresh) = &tokens.refresh_token {
            self.store
                .set_item(REFRESH_TOKEN_KEY, refresh.expose())
                .await?;
        }

        match tokens.expires_at {
            Some(expires_at) => {
                self.store
                    .set_item(EXPIRES_AT_KEY, &expires_at.timestamp().to_string())
                    .await?
            }
            None => self.store.remove_item(EXPIRES_AT_KEY).await?,
        }

        tracing::debug!("stored token set");
        Ok(())
    }

    /// Remove only the token keys.
    pub async fn forget(&self) -> Result<(), StoreError> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ID_TOKEN_KEY, EXPIRES_AT_KEY] {
            self.store.remove_item(key).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault").finish_non_exhaustive()
    }
}
