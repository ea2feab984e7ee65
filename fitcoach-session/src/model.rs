//! Domain model types for Fitcoach sessions.
//!
//! This module defines the core types used throughout the crate:
//! - [`UserId`] - Opaque identifier issued by the identity provider
//! - [`UserIdentity`] - The `{user_id, email}` pair the provider reports
//! - [`Session`] - The authenticated identity currently held by the client
//! - [`Profile`] - Extended user data stored by the backend
//! - [`ProfileUpdate`] - A partial profile update

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier (the identity provider's `sub` claim).
///
/// # Examples
///
/// ```
/// use fitcoach_session::UserId;
///
/// let id = UserId::new("3f1c9a2e-0000-4000-8000-000000000001");
/// assert_eq!(id.as_str(), "3f1c9a2e-0000-4000-8000-000000000001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub email: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// The authenticated identity currently held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier from the identity provider.
    pub user_id: UserId,

    /// Email address of the signed-in user.
    pub email: String,

    /// Random identifier used to correlate log lines for this session.
    pub session_id: Uuid,

    /// When this session was established on this client.
    pub established_at: DateTime<Utc>,
}

impl Session {
    /// Establish a new session for the given identity.
    pub fn establish(identity: UserIdentity) -> Self {
        Self {
            user_id: identity.user_id,
            email: identity.email,
            session_id: Uuid::new_v4(),
            established_at: Utc::now(),
        }
    }

    /// The `{user_id, email}` pair of this session.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity::new(self.user_id.clone(), self.email.clone())
    }
}

/// Extended user data stored by the backend.
///
/// The session layer never interprets these fields; it stores and forwards
/// whatever the profile API returns. Fields this type does not name are kept
/// in [`extra`](Profile::extra) so nothing is lost on a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Height in centimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// Weight in kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a profile lookup.
///
/// A missing profile is an expected state for new users, so it is a value
/// rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLookup {
    Found(Profile),
    Missing,
}

impl ProfileLookup {
    pub fn into_option(self) -> Option<Profile> {
        match self {
            ProfileLookup::Found(profile) => Some(profile),
            ProfileLookup::Missing => None,
        }
    }
}

impl From<Option<Profile>> for ProfileLookup {
    fn from(profile: Option<Profile>) -> Self {
        match profile {
            Some(profile) => ProfileLookup::Found(profile),
            None => ProfileLookup::Missing,
        }
    }
}

/// A partial profile update, sent to the backend verbatim.
///
/// # Examples
///
/// ```
/// use fitcoach_session::ProfileUpdate;
///
/// let update = ProfileUpdate::new().set("bio", "hi").set("weight", 72.5);
/// assert_eq!(update.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileUpdate(Map<String, Value>);

impl ProfileUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a field, replacing any earlier value for the same key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Number of fields in the update.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the update carries no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The fields of the update.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ProfileUpdate {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
