/*!
 * Device discovery for MediaHub.
 *
 * Live network scans through the device protocol. Nothing here is cached;
 * see [`crate::registry`] for the cached path used by command execution.
 */
use std::sync::Arc;

use tracing::{debug, info};

use mediahub_core::types::DeviceId;

use crate::device::{DeviceHandle, DeviceInfo, Result};
use crate::protocol::DeviceProtocol;

/// Predicate matching devices whose advertised model starts with `prefix`
pub fn model_prefix(prefix: impl Into<String>) -> impl Fn(&DeviceHandle) -> bool + Send + Sync {
    let prefix = prefix.into();
    move |handle: &DeviceHandle| handle.model().starts_with(&prefix)
}

/// Device discoverer
///
/// Wraps the protocol's scan primitive and normalizes its failures to
/// [`DeviceError::DiscoveryFailed`](crate::device::DeviceError::DiscoveryFailed).
#[derive(Debug, Clone)]
pub struct DeviceDiscoverer {
    protocol: Arc<dyn DeviceProtocol>,
}

impl DeviceDiscoverer {
    /// Create a new device discoverer
    pub fn new(protocol: Arc<dyn DeviceProtocol>) -> Self {
        Self { protocol }
    }

    /// The protocol this discoverer scans with
    pub fn protocol(&self) -> &Arc<dyn DeviceProtocol> {
        &self.protocol
    }

    /// Scan the network, optionally restricted to one device identifier
    pub async fn scan(&self, filter: Option<&DeviceId>) -> Result<Vec<DeviceHandle>> {
        match filter {
            Some(id) => debug!("Scanning with {} for device {}", self.protocol.name(), id),
            None => debug!("Scanning with {} for all devices", self.protocol.name()),
        }

        let handles = self
            .protocol
            .discover(filter)
            .await
            .map_err(|e| e.into_discovery_failure())?;

        debug!("Scan returned {} devices", handles.len());
        Ok(handles)
    }

    /// Scan the network and return the devices selected by `predicate`
    ///
    /// Handles of devices that are not selected are dropped.
    pub async fn list_available<P>(&self, predicate: P) -> Result<Vec<DeviceInfo>>
    where
        P: Fn(&DeviceHandle) -> bool,
    {
        let devices: Vec<DeviceInfo> = self
            .scan(None)
            .await?
            .into_iter()
            .filter(|handle| predicate(handle))
            .map(|handle| handle.info())
            .collect();

        info!("Discovered {} matching devices", devices.len());
        Ok(devices)
    }
}
