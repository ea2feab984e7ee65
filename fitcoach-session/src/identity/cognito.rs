//! Hosted user-pool identity provider.
//!
//! Speaks the user-pool JSON protocol: every operation is a `POST` to the
//! service endpoint with an `X-Amz-Target` header naming the operation.
//! Failures come back as `{"__type": "...Exception", "message": "..."}`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use super::jwt::{DecodedIdToken, decode_id_token};
use super::{AuthError, AuthErrorKind, IdentityProvider, SignInTokens, SignUpAttributes};
use crate::config::IdentityConfig;
use crate::error::FitcoachError;
use crate::model::UserIdentity;
use crate::store::KeyValueStore;
use crate::token::{TokenSet, TokenVault};

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";
const CONTENT_TYPE_AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Tokens within this many minutes of expiry no longer count as a valid
/// local session.
const DEFAULT_EXPIRY_BUFFER_MINUTES: i64 = 5;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthenticationResult>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AttributeType<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpRequest<'a> {
    client_id: &'a str,
    username: &'a str,
    password: &'a str,
    user_attributes: Vec<AttributeType<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfirmSignUpRequest<'a> {
    client_id: &'a str,
    username: &'a str,
    confirmation_code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GlobalSignOutRequest<'a> {
    access_token: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// [`IdentityProvider`] backed by a hosted user pool.
///
/// Tokens are persisted through a [`TokenVault`] in the shared key-value
/// store.
pub struct CognitoClient {
    http: reqwest::Client,
    endpoint: Url,
    client_id: String,
    vault: TokenVault,
    expiry_buffer: Duration,
}

impl CognitoClient {
    /// Create a client for the configured user pool.
    pub fn new(
        config: &IdentityConfig,
        timeout: std::time::Duration,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, FitcoachError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FitcoachError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            endpoint: config.endpoint_url()?,
            client_id: config.client_id.clone(),
            vault: TokenVault::new(store),
            expiry_buffer: Duration::minutes(DEFAULT_EXPIRY_BUFFER_MINUTES),
        })
    }

    /// Override how close to expiry a stored token stops counting as valid.
    pub fn with_expiry_buffer(mut self, expiry_buffer: Duration) -> Self {
        self.expiry_buffer = expiry_buffer;
        self
    }

    /// The vault this client stores tokens in.
    pub fn vault(&self) -> &TokenVault {
        &self.vault
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, AuthError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request).map_err(|e| {
            AuthError::new(
                AuthErrorKind::InvalidParameter,
                format!("failed to encode {} request: {}", operation, e),
            )
        })?;

        tracing::debug!(operation, "calling identity provider");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, operation))
            .header(CONTENT_TYPE, CONTENT_TYPE_AMZ_JSON)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let header_kind = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(':').next().unwrap_or(v).to_string());
        let bytes = response.bytes().await?;

        if status.is_success() {
            let bytes: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
            return serde_json::from_slice(bytes).map_err(|e| {
                AuthError::new(
                    AuthErrorKind::InvalidResponse,
                    format!("malformed {} response: {}", operation, e),
                )
            });
        }

        let parsed: Option<ErrorBody> = serde_json::from_slice(&bytes).ok();
        let (code, message) = match parsed {
            Some(body) => (body.kind.or(header_kind), body.message.unwrap_or_default()),
            None => (header_kind, String::from_utf8_lossy(&bytes).into_owned()),
        };

        let kind = match code {
            Some(code) => AuthErrorKind::from_code(&code),
            None if status.is_server_error() => AuthErrorKind::Unavailable,
            None => AuthErrorKind::Other(format!("HTTP {}", status.as_u16())),
        };

        tracing::debug!(operation, status = status.as_u16(), ?kind, "identity provider rejected request");

        Err(AuthError::new(kind, message))
    }

    async fn initiate_auth(
        &self,
        flow: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
    ) -> Result<AuthenticationResult, AuthError> {
        let request = InitiateAuthRequest {
            auth_flow: flow,
            client_id: &self.client_id,
            auth_parameters: parameters,
        };

        let response: InitiateAuthResponse = self.call("InitiateAuth", &request).await?;

        match (response.authentication_result, response.challenge_name) {
            (Some(result), _) => Ok(result),
            (None, Some(challenge)) => Err(AuthError::new(
                AuthErrorKind::Other("ChallengeRequired".to_string()),
                format!("sign-in requires unsupported challenge {}", challenge),
            )),
            (None, None) => Err(AuthError::new(
                AuthErrorKind::InvalidResponse,
                "InitiateAuth returned neither tokens nor a challenge",
            )),
        }
    }

    /// Build the token set to persist. Without `ExpiresIn` the ID token's
    /// `exp` claim bounds the session.
    fn token_set(result: &AuthenticationResult, decoded: &DecodedIdToken) -> TokenSet {
        let mut tokens = TokenSet::new(result.access_token.as_str(), result.id_token.as_str());
        if let Some(refresh) = &result.refresh_token {
            tokens = tokens.with_refresh_token(refresh.as_str());
        }
        let expires_at = result
            .expires_in
            .map(|expires_in| Utc::now() + Duration::seconds(expires_in))
            .or(decoded.expires_at);
        if let Some(expires_at) = expires_at {
            tokens = tokens.with_expiry(expires_at);
        }
        tokens
    }
}

impl std::fmt::Debug for CognitoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitoClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[async_trait]
impl IdentityProvider for CognitoClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInTokens, AuthError> {
        let mut parameters = serde_json::Map::new();
        parameters.insert("USERNAME".into(), email.into());
        parameters.insert("PASSWORD".into(), password.into());

        let result = self.initiate_auth("USER_PASSWORD_AUTH", parameters).await?;
        let decoded = decode_id_token(&result.id_token, Some(email))?;
        let tokens = Self::token_set(&result, &decoded);

        self.vault.save(&tokens).await?;

        tracing::info!(user_id = %decoded.identity.user_id, "signed in with identity provider");

        Ok(SignInTokens {
            identity: decoded.identity,
            tokens,
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &SignUpAttributes,
    ) -> Result<(), AuthError> {
        let mut user_attributes = vec![AttributeType {
            name: "email",
            value: email,
        }];
        if let Some(first) = attributes.first_name.as_deref() {
            user_attributes.push(AttributeType {
                name: "given_name",
                value: first,
            });
        }
        if let Some(last) = attributes.last_name.as_deref() {
            user_attributes.push(AttributeType {
                name: "family_name",
                value: last,
            });
        }

        let request = SignUpRequest {
            client_id: &self.client_id,
            username: email,
            password,
            user_attributes,
        };

        let _: serde_json::Value = self.call("SignUp", &request).await?;
        Ok(())
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let request = ConfirmSignUpRequest {
            client_id: &self.client_id,
            username: email,
            confirmation_code: code,
        };

        let _: serde_json::Value = self.call("ConfirmSignUp", &request).await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(access) = self.vault.access_token().await? else {
            tracing::debug!("no stored access token, nothing to revoke");
            return Ok(());
        };

        let result: Result<serde_json::Value, AuthError> = self
            .call(
                "GlobalSignOut",
                &GlobalSignOutRequest {
                    access_token: access.expose(),
                },
            )
            .await;

        // Local tokens are unusable after a sign-out attempt either way.
        self.vault.forget().await?;
        result.map(|_| ())
    }

    async fn current_user(&self) -> Result<Option<UserIdentity>, AuthError> {
        let Some(tokens) = self.vault.load().await? else {
            return Ok(None);
        };

        if tokens.expires_within(self.expiry_buffer) {
            tracing::debug!("stored access token is expired or about to expire");
            return Ok(None);
        }

        let decoded = decode_id_token(tokens.id_token.expose(), None)?;
        Ok(Some(decoded.identity))
    }

    async fn refresh_tokens(&self) -> Result<Option<UserIdentity>, AuthError> {
        let Some(refresh) = self.vault.refresh_token().await? else {
            tracing::debug!("no refresh token stored");
            return Ok(None);
        };

        let previous_email = match self.vault.load().await? {
            Some(tokens) => decode_id_token(tokens.id_token.expose(), None)
                .ok()
                .map(|d| d.identity.email),
            None => None,
        };

        let mut parameters = serde_json::Map::new();
        parameters.insert("REFRESH_TOKEN".into(), refresh.expose().into());

        let result = match self.initiate_auth("REFRESH_TOKEN_AUTH", parameters).await {
            Ok(result) => result,
            Err(e) if e.kind == AuthErrorKind::NotAuthorized => {
                tracing::info!("refresh token rejected: {}", e.message);
                // Rejected tokens must not restore the session later.
                self.vault.forget().await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let decoded = decode_id_token(&result.id_token, previous_email.as_deref())?;
        self.vault.save(&Self::token_set(&result, &decoded)).await?;

        tracing::debug!(user_id = %decoded.identity.user_id, "refreshed tokens");

        Ok(Some(decoded.identity))
    }
}
