//! Event envelope decoding and age filtering.
//!
//! A Device Access event arrives base64 encoded in the message data:
//!
//! ```json
//! {
//!   "eventId": "...",
//!   "timestamp": "2024-01-01T10:00:00.000Z",
//!   "resourceUpdate": {
//!     "name": "enterprises/{project}/devices/{id}",
//!     "traits": { "sdm.devices.traits.Connectivity": { "status": "ONLINE" } }
//!   },
//!   "userId": "..."
//! }
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use nestlink_devices::TraitSet;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::feed::ReceivedMessage;

/// A decoded resource update, ready for a publisher worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SdmEvent {
    pub ack_id: String,
    pub event_id: String,
    /// Short device id, without the `enterprises/.../devices/` prefix.
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub traits: TraitSet,
}

/// What the puller does with one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Older than the maximum age: acknowledge and drop.
    Stale,
    /// Undecodable: drop without acknowledging.
    Malformed(String),
    /// Decoded but carries no resource update: drop without acknowledging.
    NotResourceUpdate,
    Event(SdmEvent),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    resource_update: Option<RawResourceUpdate>,
}

#[derive(Deserialize)]
struct RawResourceUpdate {
    #[serde(default)]
    name: String,
    #[serde(default)]
    traits: Map<String, Value>,
}

/// Turns feed messages into [`Disposition`]s.
#[derive(Debug, Clone)]
pub struct EnvelopeDecoder {
    device_prefix: String,
    max_age: Duration,
}

impl EnvelopeDecoder {
    /// `project_id` is the Device Access project the events belong to.
    pub fn new(project_id: &str, max_age: std::time::Duration) -> Self {
        Self {
            device_prefix: format!("enterprises/{}/devices/", project_id),
            max_age: Duration::from_std(max_age).unwrap_or_else(|_| Duration::days(36_500)),
        }
    }

    pub fn classify(&self, message: &ReceivedMessage, now: DateTime<Utc>) -> Disposition {
        let published = match DateTime::parse_from_rfc3339(&message.publish_time) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    publish_time = %message.publish_time,
                    error = %e,
                    "Unparseable publish time, skipping age check"
                );
                None
            }
        };

        if let Some(published) = published {
            if now > published + self.max_age {
                return Disposition::Stale;
            }
        }

        let data = match STANDARD.decode(message.data.as_bytes()) {
            Ok(data) => data,
            Err(e) => return Disposition::Malformed(format!("message data is not base64: {}", e)),
        };

        let envelope: RawEnvelope = match serde_json::from_slice(&data) {
            Ok(envelope) => envelope,
            Err(e) => return Disposition::Malformed(format!("event envelope: {}", e)),
        };

        let Some(update) = envelope.resource_update else {
            return Disposition::NotResourceUpdate;
        };

        let traits = match TraitSet::from_map(update.traits) {
            Ok(traits) => traits,
            Err(e) => return Disposition::Malformed(e.to_string()),
        };

        let device_id = update
            .name
            .strip_prefix(self.device_prefix.as_str())
            .unwrap_or(&update.name)
            .to_string();
        if device_id.is_empty() {
            return Disposition::Malformed("resource update without a device name".to_string());
        }

        Disposition::Event(SdmEvent {
            ack_id: message.ack_id.clone(),
            event_id: envelope.event_id,
            device_id,
            timestamp: envelope.timestamp.or(published).unwrap_or(now),
            traits,
        })
    }
}
