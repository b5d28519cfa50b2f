//! NestLink Devices
//!
//! Everything that speaks Google's Smart Device Management (SDM) trait model.
//!
//! ## Architecture
//!
//! ```text
//!   raw trait JSON ──▶ TraitSet::parse ──▶ TraitSet
//!                                            │
//!                                            ▼
//!                                  translator::device_states ──▶ [StateEntry]
//!
//!   ST command ──▶ commands::translate_command ──▶ [SdmCommand] ──▶ SmartDeviceManagement
//! ```
//!
//! - `traits`: closed trait vocabulary, typed values and the parser
//! - `translator`: trait values to SmartThings capability states
//! - `commands`: SmartThings capability commands to SDM commands
//! - `client`: the device API seam and the `Device` model
//! - `live`: REST implementation of the device API

pub mod client;
pub mod commands;
pub mod error;
pub mod live;
pub mod traits;
pub mod translator;

pub use client::{Device, SmartDeviceManagement};
pub use commands::{translate_command, CommandError, SdmCommand};
pub use error::{Result, SdmError};
pub use live::{SdmClient, SdmClientConfig};
pub use traits::{
    EcoTrait, FanTrait, HvacStatus, SetpointTrait, TemperatureScale, ThermostatMode, TraitError,
    TraitId, TraitSet, TraitValue,
};
pub use translator::{device_states, event_states};
