//! OAuth state and the state file.
//!
//! The state file is plain JSON with kebab-case keys:
//!
//! ```json
//! {
//!   "client-id": "...",
//!   "scope": "callbacks",
//!   "token-url": "https://.../oauth/token",
//!   "state-callback-url": "https://.../callbacks",
//!   "access-token": "...",
//!   "access-token-expiry": "2024-01-01T10:00:00Z",
//!   "refresh-token": "..."
//! }
//! ```
//!
//! Tokens are stored in clear; the file is created owner-readable only.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use nestlink_core::config::oauth::DEFAULT_MIN_VALIDITY_SECS;
use nestlink_core::{fingerprint, IssuedTokens};
use serde::{Deserialize, Serialize};

use crate::error::{OAuthError, Result};

/// Callback OAuth state for one SmartThings connector installation.
#[derive(Clone, PartialEq)]
pub struct OAuthState {
    pub client_id: String,
    pub scope: String,
    pub token_url: String,
    pub state_callback_url: String,
    /// Tokens closer than this to expiry are refreshed before use.
    pub min_validity: Duration,
    access_token: String,
    access_token_expiry: Option<DateTime<Utc>>,
    refresh_token: String,
}

impl OAuthState {
    /// Fresh state without tokens.
    pub fn new(
        client_id: impl Into<String>,
        scope: impl Into<String>,
        token_url: impl Into<String>,
        state_callback_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            scope: scope.into(),
            token_url: token_url.into(),
            state_callback_url: state_callback_url.into(),
            min_validity: Duration::seconds(DEFAULT_MIN_VALIDITY_SECS),
            access_token: String::new(),
            access_token_expiry: None,
            refresh_token: String::new(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn access_token_expiry(&self) -> Option<DateTime<Utc>> {
        self.access_token_expiry
    }

    /// The access token can be used at `now` without refreshing.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.access_token_expiry {
            Some(expiry) if !self.access_token.is_empty() => expiry > now + self.min_validity,
            _ => false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Record tokens issued at `now`.
    ///
    /// A lifetime that does not fit a timestamp is rejected and leaves the
    /// state untouched.
    pub fn apply(&mut self, issued: IssuedTokens, now: DateTime<Utc>) -> Result<()> {
        let expiry = Duration::try_seconds(issued.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                OAuthError::Decode(format!("token lifetime out of range: {}s", issued.expires_in))
            })?;

        self.access_token = issued.access_token;
        self.refresh_token = issued.refresh_token;
        self.access_token_expiry = Some(expiry);
        Ok(())
    }

    fn to_persisted(&self) -> PersistedState {
        PersistedState {
            client_id: self.client_id.clone(),
            scope: self.scope.clone(),
            token_url: self.token_url.clone(),
            state_callback_url: self.state_callback_url.clone(),
            access_token: self.access_token.clone(),
            access_token_expiry: self.access_token_expiry,
            refresh_token: self.refresh_token.clone(),
        }
    }

    fn from_persisted(p: PersistedState) -> Self {
        Self {
            client_id: p.client_id,
            scope: p.scope,
            token_url: p.token_url,
            state_callback_url: p.state_callback_url,
            min_validity: Duration::seconds(DEFAULT_MIN_VALIDITY_SECS),
            access_token: p.access_token,
            access_token_expiry: p.access_token_expiry,
            refresh_token: p.refresh_token,
        }
    }
}

impl fmt::Display for OAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "client_id [{}] scope [{}] token_url [{}] state_callback_url [{}] access_token [{}] expiry [{}] refresh_token [{}]",
            self.client_id,
            self.scope,
            self.token_url,
            self.state_callback_url,
            fingerprint(&self.access_token),
            self.access_token_expiry
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            fingerprint(&self.refresh_token),
        )
    }
}

impl fmt::Debug for OAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthState")
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("token_url", &self.token_url)
            .field("state_callback_url", &self.state_callback_url)
            .field("min_validity", &self.min_validity)
            .field("access_token", &fingerprint(&self.access_token))
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token", &fingerprint(&self.refresh_token))
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PersistedState {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    token_url: String,
    #[serde(default)]
    state_callback_url: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    access_token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    refresh_token: String,
}

/// Location of the persisted OAuth state.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<OAuthState> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            OAuthError::Persist(format!("reading {}: {}", self.path.display(), e))
        })?;
        let persisted: PersistedState = serde_json::from_slice(&bytes).map_err(|e| {
            OAuthError::Persist(format!("decoding {}: {}", self.path.display(), e))
        })?;

        Ok(OAuthState::from_persisted(persisted))
    }

    /// Write the state, replacing the previous file atomically.
    pub async fn save(&self, state: &OAuthState) -> Result<()> {
        let body = serde_json::to_vec_pretty(&state.to_persisted())
            .map_err(|e| OAuthError::Persist(format!("encoding state: {}", e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        write_private(&tmp, &body)
            .await
            .map_err(|e| OAuthError::Persist(format!("writing {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            OAuthError::Persist(format!("replacing {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(path = %self.path.display(), "Saved OAuth state");
        Ok(())
    }
}

#[cfg(unix)]
async fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(body).await?;
    file.sync_all().await
}

#[cfg(not(unix))]
async fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, body).await
}
