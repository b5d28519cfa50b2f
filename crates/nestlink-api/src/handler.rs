//! ST-Schema interaction handlers.
//!
//! | interaction           | answer                                         |
//! |-----------------------|------------------------------------------------|
//! | discoveryRequest      | every device as a thermostat                   |
//! | stateRefreshRequest   | translated states per requested device         |
//! | commandRequest        | commands executed, then the fresh device state |
//! | grantCallbackAccess   | tokens obtained and persisted, empty 200       |
//! | interactionResult     | logged, empty 200                              |
//! | anything else         | global error INVALID-INTERACTION-TYPE          |
//!
//! Device API errors are reported in protocol form where possible: an
//! expired token becomes a TOKEN-EXPIRED global error, single-device
//! failures become device errors on that device's entry. Other global
//! failures surface as HTTP 502.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use nestlink_core::config::server::DEFAULT_OAUTH_STATE_FILE;
use nestlink_core::{
    DeviceError, DeviceErrorKind, DeviceState, DiscoveryDevice, GlobalErrorKind, InteractionType,
    RequestDevice, SchemaRequest, SchemaResponse, ValidationError,
};
use nestlink_devices::{device_states, translate_command, SdmError, SmartDeviceManagement};
use nestlink_oauth::{OAuthClient, OAuthState, StateFile};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span};

use crate::error::{HandlerError, RequestError, Result};

/// Request handler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Device Access project id
    pub project_id: String,
    /// Where the callback OAuth state is written after a grant
    #[serde(default = "default_state_file")]
    pub oauth_state_file: PathBuf,
    /// Log request and response bodies at debug level
    #[serde(default)]
    pub log_requests: bool,
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_OAUTH_STATE_FILE)
}

impl HandlerConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            oauth_state_file: default_state_file(),
            log_requests: false,
        }
    }
}

/// What to send back for a handled request.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerReply {
    Response(SchemaResponse),
    /// HTTP 200 without a body.
    Empty,
}

/// Handles validated ST-Schema requests.
pub struct SchemaHandler {
    sdm: Arc<dyn SmartDeviceManagement>,
    oauth: OAuthClient,
    config: HandlerConfig,
    span: Span,
}

impl SchemaHandler {
    pub fn new(
        sdm: Arc<dyn SmartDeviceManagement>,
        oauth: OAuthClient,
        config: HandlerConfig,
        span: Span,
    ) -> Self {
        Self {
            sdm,
            oauth,
            config,
            span,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub async fn handle(&self, request: SchemaRequest) -> Result<HandlerReply> {
        let span = tracing::info_span!(
            parent: &self.span,
            "interaction",
            request_id = %request.headers.request_id,
            interaction_type = %request.headers.interaction_type
        );

        async {
            if self.config.log_requests {
                tracing::debug!(request = ?request, "Handling request");
            }

            let reply = match request.headers.interaction_type {
                InteractionType::DiscoveryRequest => self.discovery(&request).await,
                InteractionType::StateRefreshRequest => self.state_refresh(&request).await,
                InteractionType::CommandRequest => self.command(&request).await,
                InteractionType::GrantCallbackAccess => self.grant_callback_access(&request).await,
                InteractionType::IntegrationDeleted => Ok(HandlerReply::Response(
                    SchemaResponse::global_error(
                        &request.headers,
                        GlobalErrorKind::InvalidInteractionType,
                        "Unimplemented Interaction Type",
                    ),
                )),
                InteractionType::InteractionResult => Ok(self.interaction_result(&request)),
                other => {
                    tracing::warn!(interaction_type = %other, "Unknown interaction type");
                    Ok(HandlerReply::Response(SchemaResponse::global_error(
                        &request.headers,
                        GlobalErrorKind::InvalidInteractionType,
                        "Unknown Interaction Type",
                    )))
                }
            };

            match &reply {
                Ok(HandlerReply::Response(response)) if self.config.log_requests => {
                    tracing::debug!(response = ?response, "Sending response");
                }
                Err(e) => tracing::error!(error = %e, "Request failed"),
                _ => {}
            }
            reply
        }
        .instrument(span)
        .await
    }

    async fn discovery(&self, request: &SchemaRequest) -> Result<HandlerReply> {
        let token = request.bearer_token().map_err(RequestError::from)?;

        let devices = match self.sdm.list_devices(token).await {
            Ok(devices) => devices,
            Err(e) => return api_error_reply(request, e),
        };

        let discovered = devices
            .into_iter()
            .map(|d| {
                let name = d.traits.custom_name().map(str::to_string);
                DiscoveryDevice::thermostat(d.id, name)
            })
            .collect::<Vec<_>>();

        tracing::info!(count = discovered.len(), "Discovered devices");
        Ok(HandlerReply::Response(SchemaResponse::discovery(
            &request.headers,
            discovered,
        )))
    }

    async fn state_refresh(&self, request: &SchemaRequest) -> Result<HandlerReply> {
        let token = request.bearer_token().map_err(RequestError::from)?;
        let now = Utc::now().timestamp_millis();

        let mut states = Vec::with_capacity(request.devices.len());
        for requested in &request.devices {
            let id = &requested.external_device_id;
            let mut entry = DeviceState::new(id.clone());

            match self.sdm.get_device(token, id).await {
                Ok(device) => entry.states = device_states(&device.traits, now),
                Err(e) if !e.is_global(true) => {
                    tracing::warn!(device_id = %id, error = %e, "Device state unavailable");
                    entry.device_error.push(e.device_error());
                }
                Err(e) => return api_error_reply(request, e),
            }
            states.push(entry);
        }

        Ok(HandlerReply::Response(SchemaResponse::device_states(
            &request.headers,
            states,
        )))
    }

    async fn command(&self, request: &SchemaRequest) -> Result<HandlerReply> {
        let token = request.bearer_token().map_err(RequestError::from)?;

        let mut states = Vec::with_capacity(request.devices.len());
        for requested in &request.devices {
            match self.command_device(token, requested).await {
                Ok(entry) => states.push(entry),
                Err(e) => return api_error_reply(request, e),
            }
        }

        Ok(HandlerReply::Response(SchemaResponse::device_states(
            &request.headers,
            states,
        )))
    }

    /// Execute one device's commands in order. A command that cannot be
    /// translated or fails on the device is recorded on the entry and the
    /// rest still run. Only failures that end the whole request are
    /// returned as errors.
    async fn command_device(
        &self,
        token: &str,
        requested: &RequestDevice,
    ) -> std::result::Result<DeviceState, SdmError> {
        let id = &requested.external_device_id;
        let mut entry = DeviceState::new(id.clone());

        for command in &requested.commands {
            let translated = match translate_command(&command.capability, &command.arguments) {
                Ok(translated) if translated.is_empty() => {
                    tracing::warn!(
                        device_id = %id,
                        capability = %command.capability,
                        command = %command.command,
                        "Unsupported command"
                    );
                    entry.device_error.push(DeviceError::new(
                        DeviceErrorKind::CapabilityNotSupported,
                        "unsupported command",
                    ));
                    continue;
                }
                Ok(translated) => translated,
                Err(e) => {
                    tracing::warn!(device_id = %id, error = %e, "Invalid command arguments");
                    entry
                        .device_error
                        .push(DeviceError::new(DeviceErrorKind::BadRequest, e.to_string()));
                    continue;
                }
            };

            for sdm_command in &translated {
                if let Err(e) = self.sdm.send_command(token, id, sdm_command).await {
                    if e.is_global(true) {
                        return Err(e);
                    }
                    tracing::warn!(device_id = %id, command = sdm_command.name(), error = %e, "Command failed");
                    entry.device_error.push(e.device_error());
                }
            }
        }

        if !entry.device_error.is_empty() {
            return Ok(entry);
        }

        match self.sdm.get_device(token, id).await {
            Ok(device) => {
                entry.states = device_states(&device.traits, Utc::now().timestamp_millis());
            }
            Err(e) => {
                tracing::warn!(device_id = %id, error = %e, "Could not read device after commands");
            }
        }
        Ok(entry)
    }

    async fn grant_callback_access(&self, request: &SchemaRequest) -> Result<HandlerReply> {
        let auth = request
            .callback_authentication
            .as_ref()
            .ok_or(RequestError::Validation(ValidationError::MissingField(
                "callbackAuthentication",
            )))?;
        let urls = request
            .callback_urls
            .as_ref()
            .ok_or(RequestError::Validation(ValidationError::MissingField(
                "callbackUrls",
            )))?;

        let mut state = OAuthState::new(
            auth.client_id.as_str(),
            auth.scope.as_str(),
            urls.oauth_token.as_str(),
            urls.state_callback.as_str(),
        );

        self.oauth
            .authorization_code(&mut state, &request.headers.request_id, &auth.code)
            .await?;
        StateFile::new(&self.config.oauth_state_file)
            .save(&state)
            .await?;

        tracing::info!(
            state = %state,
            path = %self.config.oauth_state_file.display(),
            "Callback access granted"
        );
        Ok(HandlerReply::Empty)
    }

    fn interaction_result(&self, request: &SchemaRequest) -> HandlerReply {
        let device_errors: Vec<String> = request
            .device_state
            .iter()
            .flat_map(|d| {
                d.device_error
                    .iter()
                    .map(move |e| format!("{}: {:?} {}", d.external_device_id, e.error_enum, e.detail))
            })
            .collect();

        tracing::warn!(
            originating = ?request.originating_interaction_type,
            device_errors = ?device_errors,
            global_error = ?request.global_error,
            "Interaction result reported"
        );
        HandlerReply::Empty
    }
}

/// Answer for a device API failure that ends the whole request.
fn api_error_reply(request: &SchemaRequest, e: SdmError) -> Result<HandlerReply> {
    if e.is_unauthorized() {
        tracing::warn!(error = %e, "Device API rejected the token");
        return Ok(HandlerReply::Response(SchemaResponse::global_error(
            &request.headers,
            GlobalErrorKind::TokenExpired,
            "token error",
        )));
    }
    Err(HandlerError::Downstream(e.to_string()))
}
