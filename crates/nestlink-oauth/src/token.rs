//! Token manager.
//!
//! Hands out access tokens that stay valid for at least the minimum
//! validity margin. Refreshes are single-flight: concurrent callers that find
//! the token near expiry queue on one refresh lock, and whoever runs second
//! re-checks the state and reuses the token the first one obtained.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use nestlink_core::fingerprint;
use tokio::sync::{Mutex, RwLock};
use tracing::{Instrument, Span};

use crate::error::{OAuthError, Result};
use crate::flows::OAuthClient;
use crate::state::{OAuthState, StateFile};

/// Where and with which token to push state callbacks.
#[derive(Clone, PartialEq)]
pub struct CallbackCredentials {
    pub state_callback_url: String,
    pub access_token: String,
}

impl fmt::Debug for CallbackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCredentials")
            .field("state_callback_url", &self.state_callback_url)
            .field("access_token", &fingerprint(&self.access_token))
            .finish()
    }
}

/// Source of credentials for the state callback.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn callback_credentials(&self) -> Result<CallbackCredentials>;
}

/// Owns one OAuth state and keeps its access token fresh.
pub struct TokenManager {
    state: RwLock<OAuthState>,
    refresh_lock: Mutex<()>,
    client: OAuthClient,
    store: Option<StateFile>,
    span: Span,
}

impl TokenManager {
    /// `store` receives the state after every refresh.
    pub fn new(state: OAuthState, client: OAuthClient, store: Option<StateFile>, span: Span) -> Self {
        Self {
            state: RwLock::new(state),
            refresh_lock: Mutex::new(()),
            client,
            store,
            span,
        }
    }

    /// Load the state from `store` and manage it.
    pub async fn load(store: StateFile, client: OAuthClient, span: Span) -> Result<Self> {
        let state = store.load().await?;
        tracing::info!(parent: &span, state = %state, "Loaded OAuth state");
        Ok(Self::new(state, client, Some(store), span))
    }

    /// Snapshot of the managed state.
    pub async fn state(&self) -> OAuthState {
        self.state.read().await.clone()
    }

    /// A valid access token, refreshing first if needed.
    pub async fn access_token(&self) -> Result<String> {
        Ok(self.credentials().await?.access_token)
    }

    async fn credentials(&self) -> Result<CallbackCredentials> {
        if let Some(credentials) = self.valid_credentials().await {
            return Ok(credentials);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(credentials) = self.valid_credentials().await {
            return Ok(credentials);
        }

        let mut next = self.state.read().await.clone();
        if !next.has_refresh_token() {
            return Err(OAuthError::ReauthorizationRequired);
        }

        self.client
            .refresh(&mut next)
            .instrument(self.span.clone())
            .await?;

        let credentials = CallbackCredentials {
            state_callback_url: next.state_callback_url.clone(),
            access_token: next.access_token().to_string(),
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&next).await {
                tracing::warn!(parent: &self.span, error = %e, "Failed to persist refreshed OAuth state");
            }
        }

        *self.state.write().await = next;
        Ok(credentials)
    }

    async fn valid_credentials(&self) -> Option<CallbackCredentials> {
        let state = self.state.read().await;
        state.is_valid_at(Utc::now()).then(|| CallbackCredentials {
            state_callback_url: state.state_callback_url.clone(),
            access_token: state.access_token().to_string(),
        })
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn callback_credentials(&self) -> Result<CallbackCredentials> {
        self.credentials().await
    }
}
