/*!
 * MediaHub Driver
 *
 * This crate provides the hub-facing side of the MediaHub driver: the
 * command catalog and remote layout of a media device, the two-phase pairing
 * coordinator, and the driver descriptor that ties them to the device layer.
 */

#![warn(missing_docs)]

// Re-export core types
pub use mediahub_core::prelude;

pub mod catalog;
pub mod error;
pub mod hub;
pub mod layout;
pub mod media;
pub mod pairing;

// Re-export main types for convenience
pub use catalog::{
    ids, standard_commands, CommandCatalog, CommandDescriptor, CommandId, IconSet, RemoteOperation,
};
pub use error::{Error, Result};
pub use hub::{AuthenticationMethod, DeviceDriver, DeviceDriverDescriptor};
pub use layout::{RemoteLayout, Slot, EMPTY_SLOT};
pub use media::{MediaDeviceDriver, MediaDriverDescriptor};
pub use pairing::{PairingCoordinator, PairingStart, PairingState};

/// MediaHub driver crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the driver from a loaded configuration
///
/// Installs logging as configured, so call it at most once per process.
pub fn init(config: &mediahub_core::config::Config) -> Result<()> {
    mediahub_core::init_with_config(config)?;
    mediahub_devices::init()?;
    tracing::info!("MediaHub Driver {} initialized", VERSION);
    Ok(())
}
