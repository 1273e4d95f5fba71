/*!
 * Device identity types and the device-layer error.
 *
 * A [`DeviceHandle`] is what discovery hands back for one physical device:
 * its identity plus whatever the protocol needs to reach it again. Handles
 * are immutable; a fresh discovery produces a fresh handle.
 */
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mediahub_core::{
    error::Error as CoreError,
    types::{DeviceId, Properties, Value},
};

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Discovery found no device with the requested identifier
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// The discovery scan itself failed or timed out
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Opening a connection to the device failed or timed out
    #[error("Connection to device {device_id} failed: {reason}")]
    ConnectionFailed {
        /// The device that could not be reached
        device_id: DeviceId,
        /// What the protocol reported
        reason: String,
    },

    /// An operation on an open connection failed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A pairing handshake step failed
    #[error("Pairing error: {0}")]
    Pairing(String),

    /// Reading or writing the credential store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Opaque failure raised by the underlying protocol library
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new protocol error
    pub fn protocol<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Protocol(msg.as_ref().to_string())
    }

    /// Create a new pairing error
    pub fn pairing<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Pairing(msg.as_ref().to_string())
    }

    /// Create a new storage error
    pub fn storage<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Storage(msg.as_ref().to_string())
    }

    /// Report this error as a failed discovery, keeping its message
    pub fn into_discovery_failure(self) -> Self {
        match self {
            DeviceError::DiscoveryFailed(_) => self,
            other => DeviceError::DiscoveryFailed(other.to_string()),
        }
    }

    /// Report this error as a failed connection to `device_id`, keeping its message
    pub fn into_connection_failure(self, device_id: &DeviceId) -> Self {
        match self {
            DeviceError::ConnectionFailed { .. } => self,
            other => DeviceError::ConnectionFailed {
                device_id: device_id.clone(),
                reason: other.to_string(),
            },
        }
    }

    /// Whether this error means the device does not exist on the network
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeviceError::DeviceNotFound(_))
    }
}

/// Lightweight device record handed to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// The device ID
    pub id: DeviceId,
    /// The device name
    pub name: String,
}

impl DeviceInfo {
    /// Create a new device info record
    pub fn new<I: Into<DeviceId>, S: Into<String>>(id: I, name: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Resolved identity and connection metadata for one physical device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHandle {
    id: DeviceId,
    name: String,
    model: String,
    address: String,
    properties: Properties,
}

impl DeviceHandle {
    /// Create a handle for a discovered device
    pub fn new<I, N, M, A>(id: I, name: N, model: M, address: A) -> Self
    where
        I: Into<DeviceId>,
        N: Into<String>,
        M: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            model: model.into(),
            address: address.into(),
            properties: Properties::new(),
        }
    }

    /// Attach a protocol-specific property
    pub fn with_property<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The stable device identifier
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// The name the device advertises
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw model string the device advertises
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The network address the handle was discovered at
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Protocol-specific properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Look up a protocol-specific property
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The lightweight record for this device
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo::new(self.id.clone(), self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_exposes_identity_and_properties() {
        let handle = DeviceHandle::new("AA:BB", "Living Room", "AppleTV6,2", "10.0.0.12")
            .with_property("port", 49153u16);

        assert_eq!(handle.id().as_str(), "AA:BB");
        assert_eq!(handle.model(), "AppleTV6,2");
        assert_eq!(handle.property("port"), Some(&Value::Integer(49153)));
        assert_eq!(handle.info(), DeviceInfo::new("AA:BB", "Living Room"));
    }

    #[test]
    fn test_discovery_failure_keeps_message() {
        let err = DeviceError::Transport(anyhow::anyhow!("mdns socket closed"));
        match err.into_discovery_failure() {
            DeviceError::DiscoveryFailed(reason) => assert!(reason.contains("mdns socket closed")),
            other => panic!("unexpected error: {other}"),
        }

        let err = DeviceError::DiscoveryFailed("timed out".to_string());
        assert_eq!(err.into_discovery_failure().to_string(), "Discovery failed: timed out");
    }

    #[test]
    fn test_connection_failure_names_device() {
        let device_id = DeviceId::new("AA:BB");
        let err = DeviceError::protocol("refused").into_connection_failure(&device_id);
        assert_eq!(
            err.to_string(),
            "Connection to device AA:BB failed: Protocol error: refused"
        );
    }
}
