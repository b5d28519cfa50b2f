//! SmartThings command to SDM command translation.
//!
//! One inbound capability command expands into zero or more provider
//! commands. Changing the thermostat mode always touches eco first: `eco`
//! turns eco on, any other mode turns eco off and then sets the mode.

use std::time::Duration;

use nestlink_core::config::devices::FAN_TIMER_SECS;
use serde_json::{json, Value};
use thiserror::Error;

use crate::traits::ThermostatMode;

/// Why a recognized capability command could not be translated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{capability} expects {expected} argument(s), got {actual}")]
    Arity {
        capability: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{capability} expects a {expected} argument, got {actual}")]
    ArgumentType {
        capability: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("{capability} does not support value {value}")]
    UnsupportedValue {
        capability: &'static str,
        value: String,
    },
}

/// An outbound SDM `executeCommand` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SdmCommand {
    FanSetTimer { enabled: bool, duration: Duration },
    EcoSetMode { enabled: bool },
    ModeSetMode(ThermostatMode),
    SetHeat { celsius: f64 },
    SetCool { celsius: f64 },
    SetRange { heat_celsius: f64, cool_celsius: f64 },
}

impl SdmCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SdmCommand::FanSetTimer { .. } => "sdm.devices.commands.Fan.SetTimer",
            SdmCommand::EcoSetMode { .. } => "sdm.devices.commands.ThermostatEco.SetMode",
            SdmCommand::ModeSetMode(_) => "sdm.devices.commands.ThermostatMode.SetMode",
            SdmCommand::SetHeat { .. } => {
                "sdm.devices.commands.ThermostatTemperatureSetpoint.SetHeat"
            }
            SdmCommand::SetCool { .. } => {
                "sdm.devices.commands.ThermostatTemperatureSetpoint.SetCool"
            }
            SdmCommand::SetRange { .. } => {
                "sdm.devices.commands.ThermostatTemperatureSetpoint.SetRange"
            }
        }
    }

    pub fn params(&self) -> Value {
        match self {
            SdmCommand::FanSetTimer { enabled: true, duration } => json!({
                "timerMode": "ON",
                "duration": format!("{}s", duration.as_secs()),
            }),
            SdmCommand::FanSetTimer { enabled: false, .. } => json!({ "timerMode": "OFF" }),
            SdmCommand::EcoSetMode { enabled } => json!({
                "mode": if *enabled { "MANUAL_ECO" } else { "OFF" },
            }),
            SdmCommand::ModeSetMode(mode) => json!({ "mode": mode.as_provider() }),
            SdmCommand::SetHeat { celsius } => json!({ "heatCelsius": celsius }),
            SdmCommand::SetCool { celsius } => json!({ "coolCelsius": celsius }),
            SdmCommand::SetRange {
                heat_celsius,
                cool_celsius,
            } => json!({ "heatCelsius": heat_celsius, "coolCelsius": cool_celsius }),
        }
    }

    /// Body of an `executeCommand` call.
    pub fn to_request_body(&self) -> Value {
        json!({ "command": self.name(), "params": self.params() })
    }
}

/// Translate a SmartThings capability command.
///
/// An unrecognized capability yields no commands and no error; callers
/// report it as unsupported. The `st.` prefix on the capability is optional.
pub fn translate_command(
    capability: &str,
    arguments: &[Value],
) -> Result<Vec<SdmCommand>, CommandError> {
    let name = capability.strip_prefix("st.").unwrap_or(capability);

    match name {
        "thermostatMode" => {
            let mode = single_string("thermostatMode", arguments)?;
            let commands = match mode {
                "eco" => vec![SdmCommand::EcoSetMode { enabled: true }],
                other => {
                    let mode = match other {
                        "off" => ThermostatMode::Off,
                        "heat" => ThermostatMode::Heat,
                        "cool" => ThermostatMode::Cool,
                        "auto" => ThermostatMode::HeatCool,
                        _ => {
                            return Err(CommandError::UnsupportedValue {
                                capability: "thermostatMode",
                                value: other.to_string(),
                            })
                        }
                    };
                    vec![
                        SdmCommand::EcoSetMode { enabled: false },
                        SdmCommand::ModeSetMode(mode),
                    ]
                }
            };
            Ok(commands)
        }
        "thermostatFanMode" => {
            let enabled = match single_string("thermostatFanMode", arguments)? {
                "followschedule" => true,
                "auto" => false,
                other => {
                    return Err(CommandError::UnsupportedValue {
                        capability: "thermostatFanMode",
                        value: other.to_string(),
                    })
                }
            };
            Ok(vec![SdmCommand::FanSetTimer {
                enabled,
                duration: Duration::from_secs(FAN_TIMER_SECS),
            }])
        }
        "thermostatHeatingSetpoint" => {
            let celsius = single_number("thermostatHeatingSetpoint", arguments)?;
            Ok(vec![SdmCommand::SetHeat { celsius }])
        }
        "thermostatCoolingSetpoint" => {
            let celsius = single_number("thermostatCoolingSetpoint", arguments)?;
            Ok(vec![SdmCommand::SetCool { celsius }])
        }
        _ => {
            tracing::debug!(capability, "Ignoring unimplemented SmartThings capability");
            Ok(Vec::new())
        }
    }
}

fn single<'a>(capability: &'static str, arguments: &'a [Value]) -> Result<&'a Value, CommandError> {
    match arguments {
        [value] => Ok(value),
        _ => Err(CommandError::Arity {
            capability,
            expected: 1,
            actual: arguments.len(),
        }),
    }
}

fn single_string<'a>(
    capability: &'static str,
    arguments: &'a [Value],
) -> Result<&'a str, CommandError> {
    let value = single(capability, arguments)?;
    value.as_str().ok_or_else(|| CommandError::ArgumentType {
        capability,
        expected: "string",
        actual: value.to_string(),
    })
}

fn single_number(capability: &'static str, arguments: &[Value]) -> Result<f64, CommandError> {
    let value = single(capability, arguments)?;
    value.as_f64().ok_or_else(|| CommandError::ArgumentType {
        capability,
        expected: "number",
        actual: value.to_string(),
    })
}
