//! Session configuration.
//!
//! Durations are expressed in seconds so the structure maps directly onto a
//! TOML file.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::FitcoachError;

/// Default background refresh period: well inside a 60-minute token lifetime.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 45 * 60;

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Identity provider (hosted user pool) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Region hosting the user pool, e.g. `eu-central-1`.
    pub region: String,

    /// App client identifier of the user pool.
    pub client_id: String,

    /// Override for the service endpoint (used for local stacks and tests).
    #[serde(default)]
    pub endpoint: Option<Url>,
}

impl IdentityConfig {
    /// The endpoint requests are posted to.
    pub fn endpoint_url(&self) -> Result<Url, FitcoachError> {
        match &self.endpoint {
            Some(url) => Ok(url.clone()),
            None => {
                let raw = format!("https://cognito-idp.{}.amazonaws.com/", self.region);
                Url::parse(&raw).map_err(|e| FitcoachError::Config {
                    message: format!("invalid identity region {:?}: {}", self.region, e),
                })
            }
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            client_id: String::new(),
            endpoint: None,
        }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between background token refreshes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Seconds before an HTTP request is abandoned.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Base URL of the REST backend serving profiles.
    pub api_base_url: Url,

    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl SessionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject configurations the session manager cannot run with.
    pub fn validate(&self) -> Result<(), FitcoachError> {
        if self.refresh_interval_secs == 0 {
            return Err(FitcoachError::Config {
                message: "refresh_interval_secs must be greater than zero".to_string(),
            });
        }
        if self.identity.client_id.trim().is_empty() {
            return Err(FitcoachError::Config {
                message: "identity.client_id is not set".to_string(),
            });
        }
        self.identity.endpoint_url()?;
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            api_base_url: Url::parse("http://localhost:3000/api/")
                .expect("static URL is valid"),
            identity: IdentityConfig::default(),
        }
    }
}
