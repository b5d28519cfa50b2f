//! State callback delivery.

use std::time::Duration;

use async_trait::async_trait;
use nestlink_core::config::events::DEFAULT_CALLBACK_TIMEOUT_SECS;
use nestlink_core::StateCallback;
use reqwest::{Client, StatusCode};

use crate::error::CallbackError;

/// Delivers a [`StateCallback`] to the connector's callback URL.
#[async_trait]
pub trait CallbackSender: Send + Sync {
    async fn send(&self, url: &str, callback: &StateCallback) -> Result<(), CallbackError>;
}

/// POSTs callbacks over HTTP. Only 200 and 204 count as delivered.
pub struct HttpCallbackSender {
    client: Client,
    timeout: Duration,
}

impl HttpCallbackSender {
    /// `timeout` is in seconds.
    pub fn new(timeout: u64) -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(timeout),
        }
    }
}

impl Default for HttpCallbackSender {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT_SECS)
    }
}

#[async_trait]
impl CallbackSender for HttpCallbackSender {
    async fn send(&self, url: &str, callback: &StateCallback) -> Result<(), CallbackError> {
        tracing::debug!(
            url,
            request_id = %callback.headers.request_id,
            devices = callback.device_state.len(),
            "Posting state callback"
        );

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(callback)
            .send()
            .await
            .map_err(|e| CallbackError::Transport(format!("HTTP request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => Err(CallbackError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
