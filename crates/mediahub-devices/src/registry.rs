/*!
 * Device registry for MediaHub.
 *
 * Resolves device identifiers to handles, keeping each resolved handle for a
 * fixed time so repeated commands against the same device skip the network
 * scan. Entries expire a fixed time after discovery; using a handle does not
 * extend its lifetime, so a device that moved on the network is found again
 * at the latest one TTL later.
 *
 * Two concurrent resolutions of the same missing device both scan and the
 * later cache write wins. Both handles name the same physical device, so the
 * cache lock is never held across a scan.
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, Instrument};

use mediahub_core::{cache::ExpiringCache, config::DiscoveryConfig, logging, types::DeviceId};

use crate::device::{DeviceError, DeviceHandle, DeviceInfo, Result};
use crate::discovery::DeviceDiscoverer;
use crate::protocol::DeviceProtocol;

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    /// Live scans
    discoverer: DeviceDiscoverer,
    /// Resolved handles by device ID
    cache: Mutex<ExpiringCache<DeviceId, DeviceHandle>>,
}

/// A device registry that can be shared across drivers of one family
pub type SharedDeviceRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    /// Create a registry caching at most `capacity` handles for `ttl` each
    pub fn new(protocol: Arc<dyn DeviceProtocol>, capacity: usize, ttl: Duration) -> Result<Self> {
        Ok(Self {
            discoverer: DeviceDiscoverer::new(protocol),
            cache: Mutex::new(ExpiringCache::new(capacity, ttl)?),
        })
    }

    /// Create a registry from the `[discovery]` configuration section
    pub fn from_config(protocol: Arc<dyn DeviceProtocol>, config: &DiscoveryConfig) -> Result<Self> {
        Self::new(protocol, config.cache_capacity, config.cache_ttl())
    }

    /// The discoverer used for live scans
    pub fn discoverer(&self) -> &DeviceDiscoverer {
        &self.discoverer
    }

    /// Resolve a device identifier to a handle
    ///
    /// Served from the cache while the entry is live; otherwise a scan
    /// restricted to `device_id` runs and its first result is cached.
    ///
    /// # Errors
    ///
    /// [`DeviceError::DeviceNotFound`] if the scan finds nothing,
    /// [`DeviceError::DiscoveryFailed`] if the scan itself fails.
    pub async fn resolve(&self, device_id: &DeviceId) -> Result<DeviceHandle> {
        let span = logging::device_span("resolve", device_id.as_str());
        async {
            if let Some(handle) = self.cache.lock().await.get(device_id) {
                debug!("Serving cached handle");
                return Ok(handle.clone());
            }

            debug!("No live cached handle, scanning");
            let handle = self
                .discoverer
                .scan(Some(device_id))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DeviceError::DeviceNotFound(device_id.clone()))?;

            let displaced = self
                .cache
                .lock()
                .await
                .insert(device_id.clone(), handle.clone());
            for (evicted, _) in displaced {
                debug!(evicted = %evicted, "Dropped cached handle to make room");
            }

            Ok(handle)
        }
        .instrument(span)
        .await
    }

    /// Scan the network and list the devices selected by `predicate`
    ///
    /// Always scans; never reads or fills the cache.
    pub async fn list_available<P>(&self, predicate: P) -> Result<Vec<DeviceInfo>>
    where
        P: Fn(&DeviceHandle) -> bool,
    {
        self.discoverer.list_available(predicate).await
    }

    /// Whether a live handle is cached for `device_id`
    pub async fn is_cached(&self, device_id: &DeviceId) -> bool {
        self.cache.lock().await.contains(device_id)
    }

    /// Number of cached handles, including expired ones not yet evicted
    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}
