//! NestLink Core Library
//!
//! Shared definitions for the bridge between the SmartThings schema
//! connector protocol (ST-Schema) and Google's Smart Device Management API.
//!
//! ## Modules
//!
//! - `schema`: ST-Schema request, response and callback envelopes
//! - `config`: default values, endpoints and environment variable names
//! - `redact`: one-way fingerprints for secrets that end up near log output

pub mod config;
pub mod redact;
pub mod schema;

pub use redact::fingerprint;
pub use schema::{
    AccessTokenRequest, AccessTokenResponse, Authentication, CallbackAuthentication,
    CallbackUrls, DeviceCommand, DeviceError, DeviceErrorKind, DeviceState, DiscoveryDevice,
    GlobalError, GlobalErrorKind, Headers, InteractionType, IssuedTokens, ManufacturerInfo,
    RequestDevice, SchemaRequest, SchemaResponse, StateCallback, StateEntry, TokenGrant,
    ValidationError,
};

/// Version of the crate, reported by `nestlink version` and the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
