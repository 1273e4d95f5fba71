/*!
 * MediaHub Devices
 *
 * This crate provides the device side of the MediaHub driver: the protocol
 * contract for network media devices, live discovery, a time-bounded
 * registry of resolved devices, persisted pairing credentials and scoped
 * connections.
 */

#![warn(missing_docs)]

// Re-export core types
pub use mediahub_core::prelude;

pub mod device;
pub mod discovery;
pub mod protocol;
pub mod registry;
pub mod scope;
pub mod storage;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use device::{DeviceError, DeviceHandle, DeviceInfo, Result};
pub use discovery::{model_prefix, DeviceDiscoverer};
pub use protocol::{Connection, DeviceProtocol, PairingSession, RemoteKey};
pub use registry::{DeviceRegistry, SharedDeviceRegistry};
pub use scope::ConnectionScope;
pub use storage::{CredentialStore, DeviceSettings, SharedCredentialStore};

/// MediaHub devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device layer
pub fn init() -> std::result::Result<(), mediahub_core::error::Error> {
    tracing::info!("MediaHub Devices {} initialized", VERSION);
    Ok(())
}
