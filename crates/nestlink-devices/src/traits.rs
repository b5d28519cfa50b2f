//! SDM trait vocabulary and the TraitSet parser.
//!
//! A device (or a Pub/Sub resource update) carries a JSON object keyed by
//! trait name. Only the traits listed in [`TraitId`] are understood; others
//! are skipped. A known trait with a malformed body fails the whole parse,
//! because cross-trait overrides computed from a partial set would report
//! wrong state.
//!
//! Values are normalized on the way in: provider enumeration strings become
//! Rust enums or booleans, temperatures are rounded to one decimal place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while decoding trait payloads.
#[derive(Debug, Error)]
pub enum TraitError {
    /// The payload is not a JSON object of traits.
    #[error("Invalid trait payload: {0}")]
    Payload(String),

    /// A known trait could not be decoded.
    #[error("Failed to decode trait {trait_name}: {source}")]
    Decode {
        trait_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Closed set of SDM traits the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TraitId {
    StructureInfo,
    RoomInfo,
    Connectivity,
    Fan,
    Humidity,
    Info,
    Settings,
    Temperature,
    ThermostatEco,
    ThermostatMode,
    ThermostatHvac,
    ThermostatTemperatureSetpoint,
}

impl TraitId {
    pub const ALL: [TraitId; 12] = [
        TraitId::StructureInfo,
        TraitId::RoomInfo,
        TraitId::Connectivity,
        TraitId::Fan,
        TraitId::Humidity,
        TraitId::Info,
        TraitId::Settings,
        TraitId::Temperature,
        TraitId::ThermostatEco,
        TraitId::ThermostatMode,
        TraitId::ThermostatHvac,
        TraitId::ThermostatTemperatureSetpoint,
    ];

    /// Provider trait name.
    pub fn name(self) -> &'static str {
        match self {
            TraitId::StructureInfo => "sdm.structures.traits.Info",
            TraitId::RoomInfo => "sdm.structures.traits.RoomInfo",
            TraitId::Connectivity => "sdm.devices.traits.Connectivity",
            TraitId::Fan => "sdm.devices.traits.Fan",
            TraitId::Humidity => "sdm.devices.traits.Humidity",
            TraitId::Info => "sdm.devices.traits.Info",
            TraitId::Settings => "sdm.devices.traits.Settings",
            TraitId::Temperature => "sdm.devices.traits.Temperature",
            TraitId::ThermostatEco => "sdm.devices.traits.ThermostatEco",
            TraitId::ThermostatMode => "sdm.devices.traits.ThermostatMode",
            TraitId::ThermostatHvac => "sdm.devices.traits.ThermostatHvac",
            TraitId::ThermostatTemperatureSetpoint => {
                "sdm.devices.traits.ThermostatTemperatureSetpoint"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

/// Thermostat operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThermostatMode {
    #[default]
    Off,
    Heat,
    Cool,
    HeatCool,
}

impl ThermostatMode {
    /// Unknown provider strings fall back to `Off`.
    pub fn from_provider(mode: &str) -> Self {
        match mode {
            "HEAT" => Self::Heat,
            "COOL" => Self::Cool,
            "HEATCOOL" => Self::HeatCool,
            _ => Self::Off,
        }
    }

    pub fn as_provider(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::HeatCool => "HEATCOOL",
        }
    }

    /// SmartThings `thermostatMode` value.
    pub fn as_smartthings(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "auto",
        }
    }
}

/// HVAC activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HvacStatus {
    #[default]
    Off,
    Heating,
    Cooling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureScale {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FanTrait {
    pub timer_enabled: bool,
    pub timer_timeout: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcoTrait {
    pub enabled: bool,
    pub heat_celsius: f64,
    pub cool_celsius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointTrait {
    pub heat_celsius: f64,
    pub cool_celsius: f64,
}

/// A normalized trait value.
#[derive(Debug, Clone, PartialEq)]
pub enum TraitValue {
    StructureInfo { custom_name: String },
    RoomInfo { custom_name: String },
    Connectivity { online: bool },
    Fan(FanTrait),
    Humidity { ambient_percent: f64 },
    Info { custom_name: String },
    Settings { scale: TemperatureScale },
    Temperature { ambient_celsius: f64 },
    ThermostatEco(EcoTrait),
    ThermostatMode(ThermostatMode),
    ThermostatHvac(HvacStatus),
    ThermostatTemperatureSetpoint(SetpointTrait),
}

impl TraitValue {
    pub fn id(&self) -> TraitId {
        match self {
            TraitValue::StructureInfo { .. } => TraitId::StructureInfo,
            TraitValue::RoomInfo { .. } => TraitId::RoomInfo,
            TraitValue::Connectivity { .. } => TraitId::Connectivity,
            TraitValue::Fan(_) => TraitId::Fan,
            TraitValue::Humidity { .. } => TraitId::Humidity,
            TraitValue::Info { .. } => TraitId::Info,
            TraitValue::Settings { .. } => TraitId::Settings,
            TraitValue::Temperature { .. } => TraitId::Temperature,
            TraitValue::ThermostatEco(_) => TraitId::ThermostatEco,
            TraitValue::ThermostatMode(_) => TraitId::ThermostatMode,
            TraitValue::ThermostatHvac(_) => TraitId::ThermostatHvac,
            TraitValue::ThermostatTemperatureSetpoint(_) => TraitId::ThermostatTemperatureSetpoint,
        }
    }

    /// Decode and normalize one raw trait body.
    fn decode(id: TraitId, raw: Value) -> Result<Self, TraitError> {
        let wrap = |source: serde_json::Error| TraitError::Decode {
            trait_name: id.name(),
            source,
        };

        let value = match id {
            TraitId::StructureInfo => TraitValue::StructureInfo {
                custom_name: serde_json::from_value::<RawNamed>(raw).map_err(wrap)?.custom_name,
            },
            TraitId::RoomInfo => TraitValue::RoomInfo {
                custom_name: serde_json::from_value::<RawNamed>(raw).map_err(wrap)?.custom_name,
            },
            TraitId::Info => TraitValue::Info {
                custom_name: serde_json::from_value::<RawNamed>(raw).map_err(wrap)?.custom_name,
            },
            TraitId::Connectivity => {
                let raw: RawConnectivity = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::Connectivity {
                    online: raw.status == "ONLINE",
                }
            }
            TraitId::Fan => {
                let raw: RawFan = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::Fan(FanTrait {
                    timer_enabled: raw.timer_mode == "ON",
                    timer_timeout: DateTime::parse_from_rfc3339(&raw.timer_timeout)
                        .ok()
                        .map(|t| t.with_timezone(&Utc)),
                })
            }
            TraitId::Humidity => {
                let raw: RawHumidity = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::Humidity {
                    ambient_percent: raw.ambient_humidity_percent,
                }
            }
            TraitId::Settings => {
                let raw: RawSettings = serde_json::from_value(raw).map_err(wrap)?;
                let scale = match raw.temperature_scale.as_str() {
                    "FAHRENHEIT" => TemperatureScale::Fahrenheit,
                    _ => TemperatureScale::Celsius,
                };
                TraitValue::Settings { scale }
            }
            TraitId::Temperature => {
                let raw: RawTemperature = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::Temperature {
                    ambient_celsius: round_tenths(raw.ambient_temperature_celsius),
                }
            }
            TraitId::ThermostatEco => {
                let raw: RawEco = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::ThermostatEco(EcoTrait {
                    enabled: raw.mode != "OFF",
                    heat_celsius: round_tenths(raw.heat_celsius),
                    cool_celsius: round_tenths(raw.cool_celsius),
                })
            }
            TraitId::ThermostatMode => {
                let raw: RawMode = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::ThermostatMode(ThermostatMode::from_provider(&raw.mode))
            }
            TraitId::ThermostatHvac => {
                let raw: RawHvac = serde_json::from_value(raw).map_err(wrap)?;
                let status = match raw.status.as_str() {
                    "HEATING" => HvacStatus::Heating,
                    "COOLING" => HvacStatus::Cooling,
                    _ => HvacStatus::Off,
                };
                TraitValue::ThermostatHvac(status)
            }
            TraitId::ThermostatTemperatureSetpoint => {
                let raw: RawSetpoint = serde_json::from_value(raw).map_err(wrap)?;
                TraitValue::ThermostatTemperatureSetpoint(SetpointTrait {
                    heat_celsius: round_tenths(raw.heat_celsius),
                    cool_celsius: round_tenths(raw.cool_celsius),
                })
            }
        };

        Ok(value)
    }
}

/// Round to one decimal place, halves away from zero.
pub(crate) fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawNamed {
    custom_name: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConnectivity {
    status: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawFan {
    timer_mode: String,
    timer_timeout: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawHumidity {
    ambient_humidity_percent: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawSettings {
    temperature_scale: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawTemperature {
    ambient_temperature_celsius: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawEco {
    mode: String,
    heat_celsius: f64,
    cool_celsius: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMode {
    mode: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawHvac {
    status: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawSetpoint {
    heat_celsius: f64,
    cool_celsius: f64,
}

/// Normalized traits of one device, at most one value per [`TraitId`].
///
/// Built once per decoded device or event and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraitSet {
    traits: BTreeMap<TraitId, TraitValue>,
}

impl TraitSet {
    /// Parse a JSON object of `traitName -> body`.
    pub fn parse(bytes: &[u8]) -> Result<Self, TraitError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| TraitError::Payload(e.to_string()))?;
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(TraitError::Payload(format!(
                "expected an object of traits, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build from an already decoded object of `traitName -> body`.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, TraitError> {
        let mut traits = BTreeMap::new();

        for (name, raw) in map {
            let Some(id) = TraitId::from_name(&name) else {
                tracing::debug!(trait_name = %name, "Ignoring unimplemented trait");
                continue;
            };
            traits.insert(id, TraitValue::decode(id, raw)?);
        }

        Ok(Self { traits })
    }

    pub fn get(&self, id: TraitId) -> Option<&TraitValue> {
        self.traits.get(&id)
    }

    pub fn contains(&self, id: TraitId) -> bool {
        self.traits.contains_key(&id)
    }

    /// Traits in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = &TraitValue> {
        self.traits.values()
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    pub fn fan(&self) -> Option<&FanTrait> {
        match self.get(TraitId::Fan) {
            Some(TraitValue::Fan(fan)) => Some(fan),
            _ => None,
        }
    }

    pub fn eco(&self) -> Option<&EcoTrait> {
        match self.get(TraitId::ThermostatEco) {
            Some(TraitValue::ThermostatEco(eco)) => Some(eco),
            _ => None,
        }
    }

    pub fn mode(&self) -> Option<ThermostatMode> {
        match self.get(TraitId::ThermostatMode) {
            Some(TraitValue::ThermostatMode(mode)) => Some(*mode),
            _ => None,
        }
    }

    /// True when the eco trait is present and enabled.
    pub fn eco_enabled(&self) -> bool {
        self.eco().is_some_and(|eco| eco.enabled)
    }

    /// True when the fan trait is present with its timer running.
    pub fn fan_timer_enabled(&self) -> bool {
        self.fan().is_some_and(|fan| fan.timer_enabled)
    }

    /// Device custom name from the `Info` trait, when set.
    pub fn custom_name(&self) -> Option<&str> {
        match self.get(TraitId::Info) {
            Some(TraitValue::Info { custom_name }) if !custom_name.is_empty() => Some(custom_name),
            _ => None,
        }
    }
}

impl FromIterator<TraitValue> for TraitSet {
    fn from_iter<I: IntoIterator<Item = TraitValue>>(iter: I) -> Self {
        Self {
            traits: iter.into_iter().map(|v| (v.id(), v)).collect(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
