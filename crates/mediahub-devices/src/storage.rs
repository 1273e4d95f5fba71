/*!
 * File-backed credential storage.
 *
 * One JSON document per device family holds the credentials each device
 * handed out during pairing. The store is loaded once when the driver is
 * constructed and shared by every pairing attempt and every connection.
 * Saves are serialized so two flushes never interleave on disk.
 */
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use mediahub_core::types::DeviceId;

use crate::device::{DeviceError, Result};

const DOCUMENT_VERSION: u32 = 1;

/// Settings stored for one paired device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Credentials keyed by protocol service
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    /// When the settings last changed
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    devices: BTreeMap<DeviceId, DeviceSettings>,
}

#[derive(Debug, Default)]
struct StoreState {
    document: StoreDocument,
    dirty: bool,
    generation: u64,
}

/// Credential store shared by all drivers of one device family
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    state: RwLock<StoreState>,
    flush_lock: Mutex<()>,
}

/// A credential store that can be shared across tasks
pub type SharedCredentialStore = Arc<CredentialStore>;

impl CredentialStore {
    /// Create an empty store backed by `path`; nothing is read until [`load`](Self::load)
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(StoreState::default()),
            flush_lock: Mutex::new(()),
        }
    }

    /// Create a store and load it from disk
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<SharedCredentialStore> {
        let store = Self::new(path);
        store.load().await?;
        Ok(Arc::new(store))
    }

    /// The backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory state with the file contents
    ///
    /// A missing or empty file yields an empty store.
    pub async fn load(&self) -> Result<()> {
        let _flush = self.flush_lock.lock().await;

        let document = match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreDocument::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                DeviceError::storage(format!("Failed to parse {}: {}", self.path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Credential store {} does not exist yet", self.path.display());
                StoreDocument::default()
            }
            Err(e) => {
                return Err(DeviceError::storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut state = self.write_state()?;
        info!(
            "Loaded credentials for {} devices from {}",
            document.devices.len(),
            self.path.display()
        );
        state.document = document;
        state.dirty = false;
        state.generation += 1;
        Ok(())
    }

    /// Flush pending changes to disk
    ///
    /// Returns whether anything was written. Concurrent callers are
    /// serialized; the file is replaced atomically via a temporary sibling.
    pub async fn save(&self) -> Result<bool> {
        let _flush = self.flush_lock.lock().await;

        let (contents, generation) = {
            let mut state = self.write_state()?;
            if !state.dirty {
                return Ok(false);
            }
            state.document.version = DOCUMENT_VERSION;
            let contents = serde_json::to_vec_pretty(&state.document).map_err(|e| {
                DeviceError::storage(format!("Failed to serialize credentials: {}", e))
            })?;
            (contents, state.generation)
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DeviceError::storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let tmp_path = self.temporary_path();
        tokio::fs::write(&tmp_path, &contents).await.map_err(|e| {
            DeviceError::storage(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            DeviceError::storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        let mut state = self.write_state()?;
        if state.generation == generation {
            state.dirty = false;
        }
        debug!("Saved credential store to {}", self.path.display());
        Ok(true)
    }

    /// Credentials a device handed out for `service`
    pub fn credentials(&self, device_id: &DeviceId, service: &str) -> Result<Option<String>> {
        let state = self.read_state()?;
        Ok(state
            .document
            .devices
            .get(device_id)
            .and_then(|settings| settings.credentials.get(service).cloned()))
    }

    /// Record credentials for `service`; persisted by the next [`save`](Self::save)
    pub fn set_credentials(&self, device_id: &DeviceId, service: &str, credentials: &str) -> Result<()> {
        let mut state = self.write_state()?;
        let settings = state.document.devices.entry(device_id.clone()).or_default();
        settings
            .credentials
            .insert(service.to_string(), credentials.to_string());
        settings.updated_at = Some(Utc::now());
        state.dirty = true;
        state.generation += 1;
        Ok(())
    }

    /// All settings stored for a device
    pub fn settings(&self, device_id: &DeviceId) -> Result<Option<DeviceSettings>> {
        let state = self.read_state()?;
        Ok(state.document.devices.get(device_id).cloned())
    }

    /// Forget a device; returns whether it was known
    pub fn remove_device(&self, device_id: &DeviceId) -> Result<bool> {
        let mut state = self.write_state()?;
        let removed = state.document.devices.remove(device_id).is_some();
        if removed {
            state.dirty = true;
            state.generation += 1;
        }
        Ok(removed)
    }

    /// Devices that have stored settings
    pub fn devices(&self) -> Result<Vec<DeviceId>> {
        let state = self.read_state()?;
        Ok(state.document.devices.keys().cloned().collect())
    }

    /// Whether there are changes not yet flushed
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(self.read_state()?.dirty)
    }

    fn temporary_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| DeviceError::storage("Failed to acquire read lock on credential store"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| DeviceError::storage("Failed to acquire write lock on credential store"))
    }
}
