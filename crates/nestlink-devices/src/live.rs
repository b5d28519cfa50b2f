//! REST client for the Smart Device Management API.
//!
//! ## Endpoints
//!
//! ```text
//! GET  {base}/enterprises/{project}/devices
//! GET  {base}/enterprises/{project}/devices/{id}
//! POST {base}/enterprises/{project}/devices/{id}:executeCommand
//! ```
//!
//! Error bodies follow the Google API shape
//! `{"error": {"code", "message", "status", "errors": [{"reason"}]}}` and are
//! decoded into [`SdmError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use nestlink_core::config::{devices as defaults, endpoints};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{Device, SmartDeviceManagement};
use crate::commands::SdmCommand;
use crate::error::{Result, SdmError};
use crate::traits::TraitSet;

/// Device API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdmClientConfig {
    /// Device Access project id.
    pub project_id: String,
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout in seconds for each call
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_base_url() -> String {
    endpoints::SDM_API.to_string()
}

fn default_timeout() -> u64 {
    defaults::DEFAULT_TIMEOUT_SECS
}

impl SdmClientConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct RawDevice {
    name: String,
    #[serde(rename = "type", default)]
    device_type: String,
    #[serde(default)]
    traits: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawDeviceList {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Deserialize, Default)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Live device API client.
pub struct SdmClient {
    client: Client,
    config: SdmClientConfig,
}

impl SdmClient {
    pub fn new(config: SdmClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &SdmClientConfig {
        &self.config
    }

    fn devices_url(&self) -> String {
        format!(
            "{}/enterprises/{}/devices",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id
        )
    }

    fn device_url(&self, device_id: &str) -> String {
        format!("{}/{}", self.devices_url(), self.short_name(device_id))
    }

    /// Strip the `enterprises/{project}/devices/` prefix from a resource name.
    pub fn short_name<'a>(&self, name: &'a str) -> &'a str {
        let prefix = format!("enterprises/{}/devices/", self.config.project_id);
        name.strip_prefix(prefix.as_str()).unwrap_or(name)
    }

    fn decode_device(&self, raw: RawDevice) -> Result<Device> {
        Ok(Device {
            id: self.short_name(&raw.name).to_string(),
            device_type: raw.device_type,
            traits: TraitSet::from_map(raw.traits)?,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, token: &str) -> Result<reqwest::Response> {
        let response = request
            .timeout(Duration::from_secs(self.config.timeout))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| SdmError::Transport(format!("HTTP request failed: {}", e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_default();

        let mut reasons: Vec<String> = detail.errors.into_iter().map(|e| e.reason).collect();
        // Newer error bodies only carry the canonical status.
        if detail.status == "FAILED_PRECONDITION" && !reasons.iter().any(|r| r == "failedPrecondition") {
            reasons.push("failedPrecondition".to_string());
        }

        let message = if detail.message.is_empty() {
            body
        } else {
            detail.message
        };

        Err(SdmError::Api {
            status,
            message,
            reasons,
        })
    }
}

#[async_trait]
impl SmartDeviceManagement for SdmClient {
    async fn list_devices(&self, token: &str) -> Result<Vec<Device>> {
        let response = self.send(self.client.get(self.devices_url()), token).await?;
        let list: RawDeviceList = response
            .json()
            .await
            .map_err(|e| SdmError::Decode(format!("device list: {}", e)))?;

        tracing::debug!(count = list.devices.len(), "Listed devices");
        list.devices
            .into_iter()
            .map(|raw| self.decode_device(raw))
            .collect()
    }

    async fn get_device(&self, token: &str, device_id: &str) -> Result<Device> {
        let response = self
            .send(self.client.get(self.device_url(device_id)), token)
            .await?;
        let raw: RawDevice = response
            .json()
            .await
            .map_err(|e| SdmError::Decode(format!("device {}: {}", device_id, e)))?;

        self.decode_device(raw)
    }

    async fn send_command(&self, token: &str, device_id: &str, command: &SdmCommand) -> Result<()> {
        let url = format!("{}:executeCommand", self.device_url(device_id));
        tracing::debug!(device_id, command = command.name(), "Executing device command");

        self.send(self.client.post(url).json(&command.to_request_body()), token)
            .await?;
        Ok(())
    }
}
