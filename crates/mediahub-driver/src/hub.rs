/*!
 * Hub-facing driver contract.
 *
 * The hub loads one [`DeviceDriverDescriptor`] per device family and asks it
 * for devices, pairing and [`DeviceDriver`] instances. A driver instance
 * controls one device through its commands and remote layout.
 */
use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mediahub_core::types::DeviceId;
use mediahub_devices::DeviceInfo;

use crate::catalog::{CommandDescriptor, CommandId};
use crate::error::Result;
use crate::layout::RemoteLayout;
use crate::pairing::PairingStart;

/// How the user proves control over a device while pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationMethod {
    /// No authentication
    None,
    /// A PIN shown on one side and typed on the other
    Pin,
}

impl fmt::Display for AuthenticationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationMethod::None => write!(f, "none"),
            AuthenticationMethod::Pin => write!(f, "pin"),
        }
    }
}

/// A driver instance bound to one device
#[async_trait]
pub trait DeviceDriver: Send + Sync + Debug {
    /// The device name
    fn name(&self) -> &str;

    /// The device ID
    fn device_id(&self) -> &DeviceId;

    /// The commands the device supports
    fn commands(&self) -> &[CommandDescriptor];

    /// The command with the given ID
    fn command(&self, command_id: CommandId) -> Result<&CommandDescriptor>;

    /// Execute a command on the device
    async fn execute(&self, command: &CommandDescriptor) -> Result<()>;

    /// Where the commands are placed on the remote screen
    fn remote_layout(&self) -> &RemoteLayout;

    /// Width and height of the remote layout
    fn remote_layout_size(&self) -> (usize, usize) {
        self.remote_layout().size()
    }

    /// Whether the device accepts commands
    fn is_device_ready(&self) -> bool;
}

/// The entry point of a driver for one device family
#[async_trait]
pub trait DeviceDriverDescriptor: Send + Sync + Debug {
    /// Stable driver ID
    fn driver_id(&self) -> Uuid;

    /// Name shown to the user
    fn display_name(&self) -> &str;

    /// Short description shown to the user
    fn description(&self) -> &str;

    /// The authentication method pairing requires
    fn authentication_method(&self) -> AuthenticationMethod;

    /// Whether the devices must be paired before they accept commands
    fn requires_pairing(&self) -> bool;

    /// Scan for devices of this family
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Look up one device
    async fn get_device(&self, device_id: &DeviceId) -> Result<DeviceInfo>;

    /// Start pairing with a device
    async fn start_pairing(&self, device: &DeviceInfo, remote_name: &str) -> Result<PairingStart>;

    /// Finish a pairing attempt with the credentials the user entered
    async fn finalize_pairing(
        &self,
        request_id: &str,
        credentials: &str,
        device_provides_pin: bool,
    ) -> Result<bool>;

    /// Create a driver instance for a device
    async fn create_device_instance(&self, device_id: &DeviceId) -> Result<Box<dyn DeviceDriver>>;
}
