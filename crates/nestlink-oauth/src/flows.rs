//! Token endpoint exchanges.
//!
//! Both grants POST an [`AccessTokenRequest`] to the state's token URL and
//! expect HTTP 200 with an `accessTokenResponse`. Anything else fails the
//! exchange and leaves the state untouched.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use nestlink_core::config::oauth::DEFAULT_TIMEOUT_SECS;
use nestlink_core::{fingerprint, AccessTokenRequest, AccessTokenResponse, InteractionType, IssuedTokens};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{OAuthError, Result};
use crate::state::OAuthState;

/// Token endpoint client configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    /// Connector client secret from the SmartThings developer console
    pub client_secret: String,
    /// Timeout in seconds for each exchange
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl OAuthClientConfig {
    pub fn new(client_secret: impl Into<String>) -> Self {
        Self {
            client_secret: client_secret.into(),
            timeout: default_timeout(),
        }
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_secret", &fingerprint(&self.client_secret))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs authorization code and refresh token exchanges.
pub struct OAuthClient {
    client: Client,
    config: OAuthClientConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `request_id` is the id of the `grantCallbackAccess` request that
    /// carried the code.
    pub async fn authorization_code(
        &self,
        state: &mut OAuthState,
        request_id: &str,
        code: &str,
    ) -> Result<()> {
        if self.config.client_secret.is_empty() {
            return Err(OAuthError::MissingClientSecret("authorization code"));
        }

        let request = AccessTokenRequest::authorization_code(
            request_id,
            &state.client_id,
            &self.config.client_secret,
            code,
        );
        let issued = self.exchange(&state.token_url, &request).await?;
        state.apply(issued, Utc::now())?;

        tracing::info!(client_id = %state.client_id, "Authorization code exchanged for tokens");
        Ok(())
    }

    /// Exchange the held refresh token for new tokens.
    pub async fn refresh(&self, state: &mut OAuthState) -> Result<()> {
        if self.config.client_secret.is_empty() {
            return Err(OAuthError::MissingClientSecret("refresh token"));
        }
        if !state.has_refresh_token() {
            return Err(OAuthError::ReauthorizationRequired);
        }

        let request = AccessTokenRequest::refresh(
            &state.client_id,
            &self.config.client_secret,
            state.refresh_token(),
        );
        let issued = self.exchange(&state.token_url, &request).await?;
        state.apply(issued, Utc::now())?;

        tracing::info!(
            client_id = %state.client_id,
            expiry = ?state.access_token_expiry(),
            "Access token refreshed"
        );
        Ok(())
    }

    async fn exchange(&self, url: &str, request: &AccessTokenRequest) -> Result<IssuedTokens> {
        tracing::debug!(url, request = ?request, "Sending token request");

        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(self.config.timeout))
            .json(request)
            .send()
            .await
            .map_err(|e| OAuthError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::Transport(format!("reading response body: {}", e)))?;

        if status != reqwest::StatusCode::OK {
            return Err(OAuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: AccessTokenResponse = serde_json::from_str(&body)
            .map_err(|e| OAuthError::Decode(format!("token response: {}", e)))?;

        if decoded.headers.interaction_type != InteractionType::AccessTokenResponse {
            return Err(OAuthError::UnexpectedInteractionType(
                decoded.headers.interaction_type.to_string(),
            ));
        }

        tracing::debug!(issued = ?decoded.callback_authentication, "Token response received");
        Ok(decoded.callback_authentication)
    }
}
