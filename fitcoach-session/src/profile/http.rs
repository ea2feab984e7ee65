//! REST profile client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::{ProfileApi, ProfileError};
use crate::error::FitcoachError;
use crate::model::{Profile, ProfileLookup, ProfileUpdate, UserId};
use crate::store::KeyValueStore;
use crate::token::TokenVault;

/// [`ProfileApi`] over the backend REST API.
///
/// Requests authenticate with the access token currently stored in the
/// shared [`TokenVault`].
pub struct HttpProfileApi {
    http: reqwest::Client,
    base_url: Url,
    vault: TokenVault,
}

impl HttpProfileApi {
    pub fn new(
        base_url: &Url,
        timeout: std::time::Duration,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, FitcoachError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FitcoachError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        // Url::join drops the last path segment unless the base ends in '/'.
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            vault: TokenVault::new(store),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProfileError> {
        self.base_url.join(path).map_err(|e| ProfileError::Network {
            message: format!("invalid profile URL {}: {}", path, e),
        })
    }

    async fn bearer(&self) -> Result<String, ProfileError> {
        let token = self
            .vault
            .access_token()
            .await?
            .ok_or(ProfileError::MissingToken)?;
        Ok(format!("Bearer {}", token.expose()))
    }

    async fn error_from(response: reqwest::Response) -> ProfileError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ProfileError::Http { status, message }
    }
}

/// Accept both `{"data": {...}}` envelopes and bare objects.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn parse_lookup(body: &[u8]) -> Result<ProfileLookup, ProfileError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProfileLookup::Missing);
    }
    match unwrap_envelope(serde_json::from_slice(body)?) {
        Value::Null => Ok(ProfileLookup::Missing),
        value => Ok(ProfileLookup::Found(serde_json::from_value(value)?)),
    }
}

impl std::fmt::Debug for HttpProfileApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProfileApi")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[async_trait]
impl ProfileApi for HttpProfileApi {
    async fn get_profile(&self) -> Result<ProfileLookup, ProfileError> {
        let response = self
            .http
            .get(self.endpoint("users/profile")?)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ProfileLookup::Missing);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        parse_lookup(&response.bytes().await?)
    }

    async fn update_profile(
        &self,
        update: &ProfileUpdate,
        user_id: &UserId,
    ) -> Result<Profile, ProfileError> {
        let path = format!("users/{}/profile", user_id.as_str());
        let response = self
            .http
            .put(self.endpoint(&path)?)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .json(update)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let value = unwrap_envelope(response.json::<Value>().await?);
        Ok(serde_json::from_value(value)?)
    }
}
