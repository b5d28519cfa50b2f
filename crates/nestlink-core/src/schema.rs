//! ST-Schema wire model.
//!
//! Every message exchanged with the SmartThings schema connector is a single
//! JSON object carrying a `headers` block whose `interactionType` selects the
//! shape of the rest of the body.
//!
//! ## Message Flow
//!
//! ```text
//! SmartThings ──SchemaRequest──▶ handler ──SchemaResponse──▶ SmartThings
//!
//! event pipeline ──StateCallback──▶ SmartThings state callback URL
//!
//! token manager ──AccessTokenRequest──▶ SmartThings token URL
//!               ◀──AccessTokenResponse──
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::schema as consts;
use crate::redact::fingerprint;

/// Interaction type tag carried in every message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionType {
    DiscoveryRequest,
    DiscoveryResponse,
    StateRefreshRequest,
    StateRefreshResponse,
    CommandRequest,
    CommandResponse,
    GrantCallbackAccess,
    IntegrationDeleted,
    InteractionResult,
    StateCallback,
    AccessTokenRequest,
    AccessTokenResponse,
    RefreshAccessTokens,
    /// Any tag this bridge does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl InteractionType {
    /// Response type paired with a request type.
    ///
    /// Only the three query interactions have a dedicated response type;
    /// everything else is answered as an interaction result.
    pub fn response_type(self) -> Self {
        match self {
            Self::DiscoveryRequest => Self::DiscoveryResponse,
            Self::StateRefreshRequest => Self::StateRefreshResponse,
            Self::CommandRequest => Self::CommandResponse,
            _ => Self::InteractionResult,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscoveryRequest => "discoveryRequest",
            Self::DiscoveryResponse => "discoveryResponse",
            Self::StateRefreshRequest => "stateRefreshRequest",
            Self::StateRefreshResponse => "stateRefreshResponse",
            Self::CommandRequest => "commandRequest",
            Self::CommandResponse => "commandResponse",
            Self::GrantCallbackAccess => "grantCallbackAccess",
            Self::IntegrationDeleted => "integrationDeleted",
            Self::InteractionResult => "interactionResult",
            Self::StateCallback => "stateCallback",
            Self::AccessTokenRequest => "accessTokenRequest",
            Self::AccessTokenResponse => "accessTokenResponse",
            Self::RefreshAccessTokens => "refreshAccessTokens",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Headers {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub interaction_type: InteractionType,
}

impl Headers {
    /// Fresh headers with a random request id.
    pub fn new(interaction_type: InteractionType) -> Self {
        Self::with_request_id(interaction_type, Uuid::new_v4().to_string())
    }

    pub fn with_request_id(interaction_type: InteractionType, request_id: impl Into<String>) -> Self {
        Self {
            schema: consts::NAME.to_string(),
            version: consts::VERSION.to_string(),
            request_id: request_id.into(),
            interaction_type,
        }
    }

    /// Copy of these headers answering with the paired response type.
    pub fn to_response(&self) -> Self {
        Self {
            interaction_type: self.interaction_type.response_type(),
            ..self.clone()
        }
    }
}

/// Bearer token block.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub token: String,
}

impl Authentication {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token_type: "Bearer".to_string(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication")
            .field("token_type", &self.token_type)
            .field("token", &fingerprint(&self.token))
            .finish()
    }
}

/// One capability/attribute value reported for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub component: String,
    pub capability: String,
    pub attribute: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl StateEntry {
    /// Entry on the `main` component.
    pub fn main(capability: &str, attribute: &str, value: impl Into<Value>) -> Self {
        Self {
            component: "main".to_string(),
            capability: capability.to_string(),
            attribute: attribute.to_string(),
            value: value.into(),
            unit: None,
            timestamp: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

/// Per-device error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum DeviceErrorKind {
    BadRequest,
    CapabilityNotSupported,
    DeviceDeleted,
    DeviceUnavailable,
    ResourceConstraintViolation,
    #[serde(other)]
    Unknown,
}

/// Whole-request error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum GlobalErrorKind {
    BadRequest,
    IntegrationDeleted,
    InvalidClientSecret,
    InvalidCode,
    InvalidInteractionType,
    InvalidToken,
    TokenExpired,
    UnsupportedGrantType,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceError {
    pub error_enum: DeviceErrorKind,
    #[serde(default)]
    pub detail: String,
}

impl DeviceError {
    pub fn new(error_enum: DeviceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            error_enum,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalError {
    pub error_enum: GlobalErrorKind,
    #[serde(default)]
    pub detail: String,
}

/// State (and optionally errors) of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub external_device_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_error: Vec<DeviceError>,
}

impl DeviceState {
    pub fn new(external_device_id: impl Into<String>) -> Self {
        Self {
            external_device_id: external_device_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManufacturerInfo {
    pub manufacturer_name: String,
    pub model_name: String,
}

/// A device announced in a discovery response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDevice {
    pub external_device_id: String,
    pub device_unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub device_handler_type: String,
    pub manufacturer_info: ManufacturerInfo,
}

impl DiscoveryDevice {
    /// A Nest thermostat with the fixed SmartThings device profile.
    pub fn thermostat(id: impl Into<String>, friendly_name: Option<String>) -> Self {
        let id = id.into();
        Self {
            external_device_id: id.clone(),
            device_unique_id: id,
            friendly_name,
            device_handler_type: consts::THERMOSTAT_PROFILE_ID.to_string(),
            manufacturer_info: ManufacturerInfo {
                manufacturer_name: consts::MANUFACTURER.to_string(),
                model_name: consts::THERMOSTAT_MODEL.to_string(),
            },
        }
    }
}

/// A command addressed to one device capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    #[serde(default = "default_component")]
    pub component: String,
    pub capability: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

fn default_component() -> String {
    "main".to_string()
}

/// A device named in a state refresh or command request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDevice {
    #[serde(default)]
    pub external_device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_cookie: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<DeviceCommand>,
}

/// Authorization code grant details sent with `grantCallbackAccess`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAuthentication {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub client_id: String,
}

impl fmt::Debug for CallbackAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAuthentication")
            .field("grant_type", &self.grant_type)
            .field("scope", &self.scope)
            .field("code", &fingerprint(&self.code))
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackUrls {
    #[serde(default)]
    pub oauth_token: String,
    #[serde(default)]
    pub state_callback: String,
}

/// Why a request failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported schema: {0}")]
    Schema(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Any inbound ST-Schema request.
///
/// The protocol distinguishes request shapes by `headers.interactionType`
/// only, so every optional section of every request lives here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRequest {
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<RequestDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_authentication: Option<CallbackAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_urls: Option<CallbackUrls>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_state: Vec<DeviceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_error: Option<GlobalError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating_interaction_type: Option<InteractionType>,
}

impl SchemaRequest {
    /// Check the fields the selected interaction type depends on.
    ///
    /// Unknown interaction types pass; they are answered with a protocol
    /// error rather than rejected as malformed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.headers.schema != consts::NAME {
            return Err(ValidationError::Schema(self.headers.schema.clone()));
        }
        if self.headers.request_id.is_empty() {
            return Err(ValidationError::MissingField("headers.requestId"));
        }

        match self.headers.interaction_type {
            InteractionType::DiscoveryRequest => {
                self.bearer_token()?;
            }
            InteractionType::StateRefreshRequest | InteractionType::CommandRequest => {
                self.bearer_token()?;
                if self
                    .devices
                    .iter()
                    .any(|d| d.external_device_id.is_empty())
                {
                    return Err(ValidationError::MissingField("devices[].externalDeviceId"));
                }
            }
            InteractionType::GrantCallbackAccess => {
                let auth = self
                    .callback_authentication
                    .as_ref()
                    .ok_or(ValidationError::MissingField("callbackAuthentication"))?;
                if auth.code.is_empty() {
                    return Err(ValidationError::MissingField("callbackAuthentication.code"));
                }
                if auth.client_id.is_empty() {
                    return Err(ValidationError::MissingField(
                        "callbackAuthentication.clientId",
                    ));
                }
                let urls = self
                    .callback_urls
                    .as_ref()
                    .ok_or(ValidationError::MissingField("callbackUrls"))?;
                if urls.oauth_token.is_empty() {
                    return Err(ValidationError::MissingField("callbackUrls.oauthToken"));
                }
                if urls.state_callback.is_empty() {
                    return Err(ValidationError::MissingField("callbackUrls.stateCallback"));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Bearer token supplied by SmartThings for device API calls.
    pub fn bearer_token(&self) -> Result<&str, ValidationError> {
        match &self.authentication {
            Some(auth) if !auth.token.is_empty() => Ok(&auth.token),
            _ => Err(ValidationError::MissingField("authentication.token")),
        }
    }
}

/// Any outbound ST-Schema response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResponse {
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DiscoveryDevice>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_state: Option<Vec<DeviceState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_error: Option<GlobalError>,
}

impl SchemaResponse {
    pub fn discovery(request: &Headers, devices: Vec<DiscoveryDevice>) -> Self {
        Self {
            headers: request.to_response(),
            devices: Some(devices),
            device_state: None,
            global_error: None,
        }
    }

    /// State refresh and command responses share this shape.
    pub fn device_states(request: &Headers, device_state: Vec<DeviceState>) -> Self {
        Self {
            headers: request.to_response(),
            devices: None,
            device_state: Some(device_state),
            global_error: None,
        }
    }

    pub fn global_error(request: &Headers, kind: GlobalErrorKind, detail: impl Into<String>) -> Self {
        Self {
            headers: request.to_response(),
            devices: None,
            device_state: None,
            global_error: Some(GlobalError {
                error_enum: kind,
                detail: detail.into(),
            }),
        }
    }
}

/// Asynchronous state push to the SmartThings state callback URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCallback {
    pub headers: Headers,
    pub authentication: Authentication,
    pub device_state: Vec<DeviceState>,
}

impl StateCallback {
    pub fn new(token: impl Into<String>, device_state: Vec<DeviceState>) -> Self {
        Self {
            headers: Headers::new(InteractionType::StateCallback),
            authentication: Authentication::bearer(token),
            device_state,
        }
    }
}

/// Grant-specific part of a token request.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("client_id", &self.client_id)
            .field("client_secret", &fingerprint(&self.client_secret))
            .field("grant_type", &self.grant_type)
            .field("code", &self.code.as_deref().map(fingerprint))
            .field("refresh_token", &self.refresh_token.as_deref().map(fingerprint))
            .finish()
    }
}

/// Token endpoint request, for both grant types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRequest {
    pub headers: Headers,
    pub callback_authentication: TokenGrant,
}

impl AccessTokenRequest {
    /// Authorization code grant, reusing the id of the `grantCallbackAccess` request.
    pub fn authorization_code(
        request_id: &str,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Self {
        Self {
            headers: Headers::with_request_id(InteractionType::AccessTokenRequest, request_id),
            callback_authentication: TokenGrant {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                grant_type: "authorization_code".to_string(),
                code: Some(code.to_string()),
                refresh_token: None,
            },
        }
    }

    pub fn refresh(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            headers: Headers::new(InteractionType::RefreshAccessTokens),
            callback_authentication: TokenGrant {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                grant_type: "refresh_token".to_string(),
                code: None,
                refresh_token: Some(refresh_token.to_string()),
            },
        }
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: i64,
}

impl fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("access_token", &fingerprint(&self.access_token))
            .field("refresh_token", &fingerprint(&self.refresh_token))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub callback_authentication: IssuedTokens,
}
