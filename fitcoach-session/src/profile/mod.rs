//! Extended user profile access.
//!
//! This module provides:
//! - [`ProfileApi`] - Trait for fetching and updating the user's profile
//! - [`ProfileError`] - Failures talking to the profile backend
//! - [`HttpProfileApi`] - REST implementation with bearer authentication

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Profile, ProfileLookup, ProfileUpdate, UserId};
use crate::store::StoreError;

mod http;

pub use http::HttpProfileApi;

/// Error type for profile operations.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No access token is available to authenticate the request.
    #[error("no access token available for profile request")]
    MissingToken,

    /// The backend answered with a non-success status.
    #[error("profile request failed with HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {message}")]
    Network { message: String },

    /// The response body was not a profile.
    #[error("malformed profile response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading the access token from storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<reqwest::Error> for ProfileError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network {
            message: e.to_string(),
        }
    }
}

/// Client for the backend's profile resource.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Fetch the signed-in user's profile.
    ///
    /// A user without a profile yields [`ProfileLookup::Missing`], not an
    /// error.
    async fn get_profile(&self) -> Result<ProfileLookup, ProfileError>;

    /// Apply a partial update and return the backend's resulting profile.
    async fn update_profile(
        &self,
        update: &ProfileUpdate,
        user_id: &UserId,
    ) -> Result<Profile, ProfileError>;
}
