//! Cloud Pub/Sub REST feed.
//!
//! ```text
//! POST {base}/projects/{project}/subscriptions/{sub}:pull         {"maxMessages": n}
//! POST {base}/projects/{project}/subscriptions/{sub}:acknowledge  {"ackIds": [...]}
//! ```
//!
//! Requests carry a bearer token from a [`FeedTokenSource`]. Metadata server
//! and service account tokens are cached until shortly before they expire.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use nestlink_core::config::{endpoints, events as defaults};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::FeedError;
use crate::feed::{EventFeed, ReceivedMessage};

/// Where the feed's bearer token comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FeedTokenSource {
    /// A fixed token.
    Static { token: String },
    /// A file holding the token, re-read for every request.
    File { path: PathBuf },
    /// A service account key file, exchanged for a token with a signed JWT.
    ServiceAccount { path: PathBuf },
    /// The GCE metadata server of the instance we run on.
    Metadata {
        #[serde(default = "default_metadata_url")]
        url: String,
    },
}

const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_metadata_url() -> String {
    endpoints::METADATA_TOKEN.to_string()
}

impl Default for FeedTokenSource {
    fn default() -> Self {
        Self::Metadata {
            url: default_metadata_url(),
        }
    }
}

/// Pub/Sub feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    /// GCP project owning the subscription
    pub project_id: String,
    /// Subscription id, or its full `projects/.../subscriptions/...` path
    pub subscription: String,
    #[serde(default)]
    pub token: FeedTokenSource,
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout in seconds for one pull; an empty pull that times out is not an error
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout: u64,
    /// Timeout in seconds for acknowledge and token calls
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_base_url() -> String {
    endpoints::PUBSUB_API.to_string()
}

fn default_pull_timeout() -> u64 {
    60
}

fn default_timeout() -> u64 {
    defaults::DEFAULT_CALLBACK_TIMEOUT_SECS
}

impl PubSubConfig {
    pub fn new(project_id: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            subscription: subscription.into(),
            token: FeedTokenSource::default(),
            base_url: default_base_url(),
            pull_timeout: default_pull_timeout(),
            timeout: default_timeout(),
        }
    }

    /// Full subscription resource name.
    pub fn subscription_path(&self) -> String {
        if self.subscription.starts_with("projects/") {
            self.subscription.clone()
        } else {
            format!("projects/{}/subscriptions/{}", self.project_id, self.subscription)
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PullResponse {
    received_messages: Vec<RawReceived>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawReceived {
    ack_id: String,
    message: RawMessage,
    delivery_attempt: Option<i32>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawMessage {
    data: String,
    message_id: String,
    publish_time: String,
}

/// Fields of a service account key file we need.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_google_token_uri")]
    token_uri: String,
}

fn default_google_token_uri() -> String {
    endpoints::GOOGLE_TOKEN.to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Live Pub/Sub subscription client.
pub struct PubSubClient {
    client: Client,
    config: PubSubConfig,
    cached: Mutex<Option<CachedToken>>,
}

impl PubSubClient {
    pub fn new(config: PubSubConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            cached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.subscription_path(),
            method
        )
    }

    async fn bearer_token(&self) -> Result<String, FeedError> {
        match &self.config.token {
            FeedTokenSource::Static { token } => Ok(token.clone()),
            FeedTokenSource::File { path } => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    FeedError::Credentials(format!("reading {}: {}", path.display(), e))
                })?;
                let token = raw.trim();
                if token.is_empty() {
                    return Err(FeedError::Credentials(format!("{} is empty", path.display())));
                }
                Ok(token.to_string())
            }
            FeedTokenSource::ServiceAccount { path } => {
                self.cached_token(|| self.service_account_token(path)).await
            }
            FeedTokenSource::Metadata { url } => self.cached_token(|| self.metadata_token(url)).await,
        }
    }

    async fn cached_token<F, Fut>(&self, fetch: F) -> Result<String, FeedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, FeedError>>,
    {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.expires_at > Utc::now() {
                return Ok(c.token.clone());
            }
        }

        let token = fetch().await?;
        // Renew a minute early.
        let lifetime = (token.expires_in - 60).max(0);
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });
        Ok(token.access_token)
    }

    async fn metadata_token(&self, url: &str) -> Result<AccessToken, FeedError> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.timeout))
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| FeedError::Credentials(format!("metadata server: {}", e)))?;

        if !response.status().is_success() {
            return Err(FeedError::Credentials(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::Credentials(format!("metadata token: {}", e)))
    }

    async fn service_account_token(&self, path: &Path) -> Result<AccessToken, FeedError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FeedError::Credentials(format!("reading {}: {}", path.display(), e)))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| FeedError::Credentials(format!("{}: {}", path.display(), e)))?;
        let assertion = sign_assertion(&key, Utc::now())?;

        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode(JWT_BEARER_GRANT),
            urlencoding::encode(&assertion)
        );
        let response = self
            .client
            .post(&key.token_uri)
            .timeout(Duration::from_secs(self.config.timeout))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| FeedError::Credentials(format!("token endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::Credentials(format!(
                "token endpoint returned {}: {}",
                status, message
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::Credentials(format!("service account token: {}", e)))
    }

    async fn post(&self, method: &str, body: serde_json::Value, timeout: u64) -> Result<reqwest::Response, FeedError> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.url(method))
            .timeout(Duration::from_secs(timeout))
            .header("Authorization", format!("Bearer {}", token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FeedError::Timeout
                } else {
                    FeedError::Transport(format!("HTTP request failed: {}", e))
                }
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(FeedError::Api { status, message })
    }
}

/// Signs the RS256 JWT a service account trades for an access token.
fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, FeedError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| FeedError::Credentials(format!("service account private key: {}", e)))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: PUBSUB_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };

    encode(&header, &claims, &encoding_key)
        .map_err(|e| FeedError::Credentials(format!("signing assertion: {}", e)))
}

#[async_trait]
impl EventFeed for PubSubClient {
    async fn pull(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, FeedError> {
        let response = match self
            .post("pull", json!({ "maxMessages": max_messages }), self.config.pull_timeout)
            .await
        {
            Ok(response) => response,
            Err(FeedError::Timeout) => {
                tracing::trace!("Pull timed out without messages");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let pulled: PullResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(format!("pull response: {}", e)))?;

        Ok(pulled
            .received_messages
            .into_iter()
            .map(|raw| ReceivedMessage {
                ack_id: raw.ack_id,
                message_id: raw.message.message_id,
                data: raw.message.data,
                publish_time: raw.message.publish_time,
                delivery_attempt: raw.delivery_attempt,
            })
            .collect())
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<(), FeedError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.post("acknowledge", json!({ "ackIds": ack_ids }), self.config.timeout)
            .await?;
        tracing::debug!(count = ack_ids.len(), "Acknowledged messages");
        Ok(())
    }
}
