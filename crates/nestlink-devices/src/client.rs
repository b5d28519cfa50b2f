//! Device API seam.

use async_trait::async_trait;

use crate::commands::SdmCommand;
use crate::error::Result;
use crate::traits::TraitSet;

/// A device as returned by the device API.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Short identifier, without the `enterprises/{project}/devices/` prefix.
    pub id: String,
    /// Provider device type, e.g. `sdm.devices.types.THERMOSTAT`.
    pub device_type: String,
    pub traits: TraitSet,
}

/// Smart Device Management operations used by the bridge.
///
/// Every call carries the end user's bearer token; implementations apply
/// their own call timeout.
#[async_trait]
pub trait SmartDeviceManagement: Send + Sync {
    async fn list_devices(&self, token: &str) -> Result<Vec<Device>>;

    async fn get_device(&self, token: &str, device_id: &str) -> Result<Device>;

    async fn send_command(&self, token: &str, device_id: &str, command: &SdmCommand) -> Result<()>;
}
