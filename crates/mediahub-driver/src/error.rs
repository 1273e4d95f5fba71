/*!
 * Error types for the MediaHub driver crate.
 */
use thiserror::Error;

use mediahub_core::types::DeviceId;
use mediahub_devices::DeviceError;

use crate::catalog::CommandId;

/// Error type for hub-facing driver operations
#[derive(Error, Debug)]
pub enum Error {
    /// The pairing request is unknown, expired or already finalized
    #[error("The pairing request ID '{0}' is not found")]
    PairingRequestNotFound(String),

    /// The device does not offer a command with this ID
    #[error("Command {command_id} not found for device {device_name}")]
    CommandNotFound {
        /// Display name of the device
        device_name: String,
        /// The requested command ID
        command_id: CommandId,
    },

    /// Resolving, connecting to or operating the device failed
    #[error("Command {command_id} failed on device {device_id}: {source}")]
    CommandExecutionFailed {
        /// The target device
        device_id: DeviceId,
        /// The command being executed
        command_id: CommandId,
        /// The underlying failure
        #[source]
        source: DeviceError,
    },

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] mediahub_core::error::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new validation error
    pub fn validation<S: AsRef<str>>(msg: S) -> Self {
        Error::Validation(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }

    /// Whether the target device could not be found on the network
    pub fn is_device_not_found(&self) -> bool {
        match self {
            Error::Device(e) => e.is_not_found(),
            Error::CommandExecutionFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
