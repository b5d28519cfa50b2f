//! Trait to SmartThings state translation.
//!
//! Each trait value contributes zero or more capability states. Some traits
//! consult their neighbours in the same [`TraitSet`]:
//!
//! - eco enabled reports `thermostatMode` as `eco` and swaps in eco setpoints
//! - a running fan timer reports the operating state as `fan only`
//! - mode `off` without eco collapses the supported fan modes to `auto`
//!
//! Translation is pure; the input set is never modified.

use nestlink_core::StateEntry;
use serde_json::json;

use crate::traits::{HvacStatus, ThermostatMode, TraitSet, TraitValue};

const SUPPORTED_THERMOSTAT_MODES: [&str; 5] = ["off", "heat", "cool", "auto", "eco"];

/// States contributed by one trait value.
pub fn trait_states(value: &TraitValue, traits: &TraitSet) -> Vec<StateEntry> {
    match value {
        TraitValue::Connectivity { online } => {
            let status = if *online { "online" } else { "offline" };
            vec![StateEntry::main("st.healthCheck", "healthStatus", status)]
        }
        TraitValue::Fan(fan) => {
            let fan_mode = if fan.timer_enabled {
                "followschedule"
            } else {
                "auto"
            };

            let supported = if traits.mode() == Some(ThermostatMode::Off) && !traits.eco_enabled() {
                tracing::debug!("Thermostat is off without eco, only the auto fan mode is available");
                json!(["auto"])
            } else {
                json!(["auto", "followschedule"])
            };

            vec![
                StateEntry::main("st.thermostatFanMode", "thermostatFanMode", fan_mode),
                StateEntry::main(
                    "st.thermostatFanMode",
                    "supportedThermostatFanModes",
                    supported,
                ),
            ]
        }
        TraitValue::Humidity { ambient_percent } => vec![StateEntry::main(
            "st.relativeHumidityMeasurement",
            "humidity",
            *ambient_percent,
        )],
        TraitValue::Temperature { ambient_celsius } => vec![StateEntry::main(
            "st.temperatureMeasurement",
            "temperature",
            *ambient_celsius,
        )
        .with_unit("C")],
        TraitValue::ThermostatMode(mode) => {
            let reported = if traits.eco_enabled() {
                tracing::debug!(mode = mode.as_smartthings(), "Overriding thermostat mode to eco");
                "eco"
            } else {
                mode.as_smartthings()
            };

            vec![
                StateEntry::main("st.thermostatMode", "thermostatMode", reported),
                StateEntry::main(
                    "st.thermostatMode",
                    "supportedThermostatModes",
                    json!(SUPPORTED_THERMOSTAT_MODES),
                ),
            ]
        }
        TraitValue::ThermostatHvac(status) => {
            let reported = if traits.fan_timer_enabled() {
                "fan only"
            } else {
                match status {
                    HvacStatus::Off => "idle",
                    HvacStatus::Heating => "heating",
                    HvacStatus::Cooling => "cooling",
                }
            };

            vec![StateEntry::main(
                "st.thermostatOperatingState",
                "thermostatOperatingState",
                reported,
            )]
        }
        TraitValue::ThermostatTemperatureSetpoint(setpoint) => {
            let (heat, cool) = match traits.eco() {
                Some(eco) if eco.enabled => {
                    tracing::debug!(
                        heat = eco.heat_celsius,
                        cool = eco.cool_celsius,
                        "Reporting eco setpoints"
                    );
                    (eco.heat_celsius, eco.cool_celsius)
                }
                _ => (setpoint.heat_celsius, setpoint.cool_celsius),
            };

            let mut states = Vec::with_capacity(2);
            if cool > 0.0 {
                states.push(
                    StateEntry::main("st.thermostatCoolingSetpoint", "coolingSetpoint", cool)
                        .with_unit("C"),
                );
            }
            if heat > 0.0 {
                states.push(
                    StateEntry::main("st.thermostatHeatingSetpoint", "heatingSetpoint", heat)
                        .with_unit("C"),
                );
            }
            states
        }
        TraitValue::StructureInfo { .. }
        | TraitValue::RoomInfo { .. }
        | TraitValue::Info { .. }
        | TraitValue::Settings { .. }
        | TraitValue::ThermostatEco(_) => Vec::new(),
    }
}

/// All states of a device, each stamped with `timestamp_ms`.
pub fn device_states(traits: &TraitSet, timestamp_ms: i64) -> Vec<StateEntry> {
    traits
        .iter()
        .flat_map(|value| trait_states(value, traits))
        .map(|mut entry| {
            entry.timestamp = Some(timestamp_ms);
            entry
        })
        .collect()
}

/// Health entry appended to every state callback.
///
/// Always reports `offline`, even when a Connectivity trait in the same
/// update says otherwise.
pub fn health_placeholder(timestamp_ms: i64) -> StateEntry {
    let mut entry = StateEntry::main("st.healthcheck", "healthStatus", "offline");
    entry.timestamp = Some(timestamp_ms);
    entry
}

/// States pushed to the state callback for one event.
pub fn event_states(traits: &TraitSet, timestamp_ms: i64) -> Vec<StateEntry> {
    let mut states = device_states(traits, timestamp_ms);
    states.push(health_placeholder(timestamp_ms));
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{EcoTrait, FanTrait, SetpointTrait};
    use serde_json::Value;

    fn value_of<'a>(states: &'a [StateEntry], attribute: &str) -> Option<&'a Value> {
        states
            .iter()
            .find(|s| s.attribute == attribute)
            .map(|s| &s.value)
    }

    fn eco(enabled: bool) -> TraitValue {
        TraitValue::ThermostatEco(EcoTrait {
            enabled,
            heat_celsius: 15.5,
            cool_celsius: 28.0,
        })
    }

    #[test]
    fn test_connectivity_state() {
        let traits = TraitSet::parse(br#"{"sdm.devices.traits.Connectivity":{"status":"ONLINE"}}"#)
            .unwrap();
        let states = device_states(&traits, 1000);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].component, "main");
        assert_eq!(states[0].capability, "st.healthCheck");
        assert_eq!(states[0].attribute, "healthStatus");
        assert_eq!(states[0].value, json!("online"));
        assert_eq!(states[0].timestamp, Some(1000));
    }

    #[test]
    fn test_temperature_state() {
        let traits = TraitSet::parse(
            br#"{"sdm.devices.traits.Temperature":{"ambientTemperatureCelsius":21.26}}"#,
        )
        .unwrap();
        let states = device_states(&traits, 5);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].capability, "st.temperatureMeasurement");
        assert_eq!(states[0].value, json!(21.3));
        assert_eq!(states[0].unit.as_deref(), Some("C"));
    }

    #[test]
    fn test_eco_overrides_mode() {
        for mode in [
            ThermostatMode::Off,
            ThermostatMode::Heat,
            ThermostatMode::Cool,
            ThermostatMode::HeatCool,
        ] {
            let traits: TraitSet = [TraitValue::ThermostatMode(mode), eco(true)]
                .into_iter()
                .collect();
            let states = device_states(&traits, 0);
            assert_eq!(value_of(&states, "thermostatMode"), Some(&json!("eco")));
            assert_eq!(
                value_of(&states, "supportedThermostatModes"),
                Some(&json!(["off", "heat", "cool", "auto", "eco"]))
            );
        }
    }

    #[test]
    fn test_mode_without_eco() {
        let traits: TraitSet = [TraitValue::ThermostatMode(ThermostatMode::HeatCool), eco(false)]
            .into_iter()
            .collect();
        let states = device_states(&traits, 0);
        assert_eq!(value_of(&states, "thermostatMode"), Some(&json!("auto")));
    }

    #[test]
    fn test_fan_modes_collapse_when_off() {
        let fan = TraitValue::Fan(FanTrait {
            timer_enabled: false,
            timer_timeout: None,
        });

        let traits: TraitSet = [fan.clone(), TraitValue::ThermostatMode(ThermostatMode::Off)]
            .into_iter()
            .collect();
        let states = device_states(&traits, 0);
        assert_eq!(
            value_of(&states, "supportedThermostatFanModes"),
            Some(&json!(["auto"]))
        );

        let traits: TraitSet = [
            fan.clone(),
            TraitValue::ThermostatMode(ThermostatMode::Off),
            eco(true),
        ]
        .into_iter()
        .collect();
        let states = device_states(&traits, 0);
        assert_eq!(
            value_of(&states, "supportedThermostatFanModes"),
            Some(&json!(["auto", "followschedule"]))
        );

        let traits: TraitSet = [fan, TraitValue::ThermostatMode(ThermostatMode::Heat)]
            .into_iter()
            .collect();
        let states = device_states(&traits, 0);
        assert_eq!(
            value_of(&states, "supportedThermostatFanModes"),
            Some(&json!(["auto", "followschedule"]))
        );
        assert_eq!(value_of(&states, "thermostatFanMode"), Some(&json!("auto")));
    }

    #[test]
    fn test_fan_timer_overrides_hvac() {
        let traits: TraitSet = [
            TraitValue::Fan(FanTrait {
                timer_enabled: true,
                timer_timeout: None,
            }),
            TraitValue::ThermostatHvac(HvacStatus::Heating),
        ]
        .into_iter()
        .collect();
        let states = device_states(&traits, 0);
        assert_eq!(
            value_of(&states, "thermostatOperatingState"),
            Some(&json!("fan only"))
        );
        assert_eq!(
            value_of(&states, "thermostatFanMode"),
            Some(&json!("followschedule"))
        );
    }

    #[test]
    fn test_hvac_status_mapping() {
        for (status, expected) in [
            (HvacStatus::Off, "idle"),
            (HvacStatus::Heating, "heating"),
            (HvacStatus::Cooling, "cooling"),
        ] {
            let traits: TraitSet = [TraitValue::ThermostatHvac(status)].into_iter().collect();
            let states = device_states(&traits, 0);
            assert_eq!(
                value_of(&states, "thermostatOperatingState"),
                Some(&json!(expected))
            );
        }
    }

    #[test]
    fn test_setpoints_use_eco_values() {
        let setpoint = TraitValue::ThermostatTemperatureSetpoint(SetpointTrait {
            heat_celsius: 20.0,
            cool_celsius: 24.0,
        });

        let traits: TraitSet = [setpoint.clone(), eco(true)].into_iter().collect();
        let states = device_states(&traits, 0);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].attribute, "coolingSetpoint");
        assert_eq!(states[0].value, json!(28.0));
        assert_eq!(states[1].attribute, "heatingSetpoint");
        assert_eq!(states[1].value, json!(15.5));

        let traits: TraitSet = [setpoint, eco(false)].into_iter().collect();
        let states = device_states(&traits, 0);
        assert_eq!(value_of(&states, "coolingSetpoint"), Some(&json!(24.0)));
        assert_eq!(value_of(&states, "heatingSetpoint"), Some(&json!(20.0)));
    }

    #[test]
    fn test_unset_setpoints_are_omitted() {
        let traits: TraitSet = [TraitValue::ThermostatTemperatureSetpoint(SetpointTrait {
            heat_celsius: 19.5,
            cool_celsius: 0.0,
        })]
        .into_iter()
        .collect();
        let states = device_states(&traits, 0);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].capability, "st.thermostatHeatingSetpoint");
    }

    #[test]
    fn test_silent_traits() {
        let traits = TraitSet::parse(
            br#"{
                "sdm.devices.traits.Info": {"customName": "Hall"},
                "sdm.devices.traits.Settings": {"temperatureScale": "CELSIUS"},
                "sdm.structures.traits.Info": {"customName": "Home"},
                "sdm.devices.traits.ThermostatEco": {"mode": "MANUAL_ECO"}
            }"#,
        )
        .unwrap();
        assert!(device_states(&traits, 0).is_empty());
    }

    #[test]
    fn test_event_states_append_health_placeholder() {
        let traits = TraitSet::parse(br#"{"sdm.devices.traits.Connectivity":{"status":"ONLINE"}}"#)
            .unwrap();
        let states = event_states(&traits, 42);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].value, json!("online"));

        let last = &states[1];
        assert_eq!(last.capability, "st.healthcheck");
        assert_eq!(last.attribute, "healthStatus");
        assert_eq!(last.value, json!("offline"));
        assert!(states.iter().all(|s| s.timestamp == Some(42)));
    }

    #[test]
    fn test_translation_does_not_touch_input() {
        let traits: TraitSet = [TraitValue::ThermostatMode(ThermostatMode::Cool), eco(true)]
            .into_iter()
            .collect();
        let before = traits.clone();
        let _ = device_states(&traits, 0);
        assert_eq!(traits, before);
    }
}
