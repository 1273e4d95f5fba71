//! In-memory device protocol for tests and demos.
//!
//! [`MockProtocol`] serves a fixed list of devices, counts every network
//! call, records the remote operations it receives, and can be told to fail
//! or stall at each step.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;

use mediahub_core::types::DeviceId;

use crate::device::{DeviceError, DeviceHandle, Result};
use crate::protocol::{Connection, DeviceProtocol, PairingSession, RemoteKey};
use crate::storage::{CredentialStore, SharedCredentialStore};

/// PIN the mock devices accept unless told otherwise
pub const DEFAULT_PIN: &str = "1234";

/// A remote operation received by a [`MockConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedAction {
    /// `turn_on` was called
    TurnOn,
    /// `turn_off` was called
    TurnOff,
    /// `press` was called with the key
    Press(RemoteKey),
    /// `volume_up` was called
    VolumeUp,
    /// `volume_down` was called
    VolumeDown,
}

/// Call counters shared by a mock protocol and everything it hands out
#[derive(Debug, Default)]
pub struct MockStats {
    discover_calls: AtomicUsize,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    pair_calls: AtomicUsize,
    sessions_closed: AtomicUsize,
    actions: Mutex<Vec<RecordedAction>>,
}

impl MockStats {
    /// Number of discovery scans
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// Number of connection attempts
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of connection closes
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Number of pairing sessions opened
    pub fn pair_calls(&self) -> usize {
        self.pair_calls.load(Ordering::SeqCst)
    }

    /// Number of pairing sessions closed
    pub fn sessions_closed(&self) -> usize {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    /// Remote operations received so far, in order
    pub fn actions(&self) -> Vec<RecordedAction> {
        self.actions.lock().expect("lock poisoned").clone()
    }

    /// Yield until at least `count` connections were closed
    ///
    /// Panics if background closes do not happen within a bounded number of
    /// scheduler turns.
    pub async fn wait_for_close_calls(&self, count: usize) {
        for _ in 0..1_000 {
            if self.close_calls() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} closed connections, saw {}", count, self.close_calls());
    }

    /// Yield until at least `count` pairing sessions were closed
    pub async fn wait_for_sessions_closed(&self, count: usize) {
        for _ in 0..1_000 {
            if self.sessions_closed() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} closed sessions, saw {}", count, self.sessions_closed());
    }

    fn record(&self, action: RecordedAction) {
        self.actions.lock().expect("lock poisoned").push(action);
    }
}

#[derive(Debug)]
struct Behavior {
    fail_discovery: AtomicBool,
    fail_connect: AtomicBool,
    fail_operations: AtomicBool,
    fail_close: AtomicBool,
    hang_operations: AtomicBool,
    hang_pairing: AtomicBool,
    fail_begin: AtomicBool,
    device_provides_pin: AtomicBool,
    expected_pin: Mutex<String>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            fail_discovery: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_operations: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            hang_operations: AtomicBool::new(false),
            hang_pairing: AtomicBool::new(false),
            fail_begin: AtomicBool::new(false),
            device_provides_pin: AtomicBool::new(true),
            expected_pin: Mutex::new(DEFAULT_PIN.to_string()),
        }
    }
}

impl Behavior {
    fn is(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

/// A mock implementation of [`DeviceProtocol`]
#[derive(Debug, Default)]
pub struct MockProtocol {
    devices: Mutex<Vec<DeviceHandle>>,
    stats: Arc<MockStats>,
    behavior: Arc<Behavior>,
}

impl MockProtocol {
    /// Create a mock protocol that finds no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device the scans will find
    pub fn with_device(self, handle: DeviceHandle) -> Self {
        self.devices.lock().expect("lock poisoned").push(handle);
        self
    }

    /// Replace the device with the same identifier, as if it moved on the network
    pub fn replace_device(&self, handle: DeviceHandle) {
        let mut devices = self.devices.lock().expect("lock poisoned");
        devices.retain(|d| d.id() != handle.id());
        devices.push(handle);
    }

    /// Take a device off the network
    pub fn remove_device(&self, id: &DeviceId) {
        self.devices
            .lock()
            .expect("lock poisoned")
            .retain(|d| d.id() != id);
    }

    /// The shared call counters
    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }

    /// Make scans fail with a transport error
    pub fn set_fail_discovery(&self, fail: bool) {
        self.behavior.fail_discovery.store(fail, Ordering::SeqCst);
    }

    /// Make connection attempts fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.behavior.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make remote operations fail
    pub fn set_fail_operations(&self, fail: bool) {
        self.behavior.fail_operations.store(fail, Ordering::SeqCst);
    }

    /// Make closing a connection fail (after counting it)
    pub fn set_fail_close(&self, fail: bool) {
        self.behavior.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Make remote operations never complete
    pub fn set_hang_operations(&self, hang: bool) {
        self.behavior.hang_operations.store(hang, Ordering::SeqCst);
    }

    /// Make pairing handshake steps never complete
    pub fn set_hang_pairing(&self, hang: bool) {
        self.behavior.hang_pairing.store(hang, Ordering::SeqCst);
    }

    /// Make the first pairing step fail
    pub fn set_fail_begin(&self, fail: bool) {
        self.behavior.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Choose whether devices display the PIN themselves
    pub fn set_device_provides_pin(&self, provides: bool) {
        self.behavior
            .device_provides_pin
            .store(provides, Ordering::SeqCst);
    }

    /// Change the PIN that completes pairing
    pub fn set_expected_pin(&self, pin: &str) {
        *self.behavior.expected_pin.lock().expect("lock poisoned") = pin.to_string();
    }
}

#[async_trait]
impl DeviceProtocol for MockProtocol {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn discover(&self, filter: Option<&DeviceId>) -> Result<Vec<DeviceHandle>> {
        self.stats.discover_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if Behavior::is(&self.behavior.fail_discovery) {
            return Err(DeviceError::Transport(anyhow!("mDNS scan timed out")));
        }

        let devices = self.devices.lock().expect("lock poisoned");
        Ok(devices
            .iter()
            .filter(|d| filter.map_or(true, |id| d.id() == id))
            .cloned()
            .collect())
    }

    async fn connect(
        &self,
        handle: &DeviceHandle,
        _storage: &CredentialStore,
    ) -> Result<Box<dyn Connection>> {
        self.stats.connect_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if Behavior::is(&self.behavior.fail_connect) {
            return Err(DeviceError::Transport(anyhow!(
                "connection to {} refused",
                handle.address()
            )));
        }

        Ok(Box::new(MockConnection {
            stats: self.stats.clone(),
            behavior: self.behavior.clone(),
        }))
    }

    async fn pair(
        &self,
        handle: &DeviceHandle,
        service: &str,
        storage: SharedCredentialStore,
        remote_name: &str,
    ) -> Result<Box<dyn PairingSession>> {
        self.stats.pair_calls.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockPairingSession {
            device_id: handle.id().clone(),
            service: service.to_string(),
            remote_name: remote_name.to_string(),
            storage,
            stats: self.stats.clone(),
            behavior: self.behavior.clone(),
            entered_pin: None,
            paired: false,
        }))
    }
}

/// Connection handed out by [`MockProtocol`]
#[derive(Debug)]
pub struct MockConnection {
    stats: Arc<MockStats>,
    behavior: Arc<Behavior>,
}

impl MockConnection {
    async fn perform(&self, action: RecordedAction) -> Result<()> {
        if Behavior::is(&self.behavior.hang_operations) {
            futures::future::pending::<()>().await;
        }
        if Behavior::is(&self.behavior.fail_operations) {
            return Err(DeviceError::protocol(format!("{:?} rejected by device", action)));
        }
        self.stats.record(action);
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn turn_on(&self) -> Result<()> {
        self.perform(RecordedAction::TurnOn).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.perform(RecordedAction::TurnOff).await
    }

    async fn press(&self, key: RemoteKey) -> Result<()> {
        self.perform(RecordedAction::Press(key)).await
    }

    async fn volume_up(&self) -> Result<()> {
        self.perform(RecordedAction::VolumeUp).await
    }

    async fn volume_down(&self) -> Result<()> {
        self.perform(RecordedAction::VolumeDown).await
    }

    async fn close(&self) -> Result<()> {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        if Behavior::is(&self.behavior.fail_close) {
            return Err(DeviceError::protocol("socket already closed"));
        }
        Ok(())
    }
}

/// Pairing session handed out by [`MockProtocol`]
///
/// Beginning the handshake records the remote's client identity under
/// [`client_service`]. Pairing succeeds when the entered PIN matches the
/// expected one; the negotiated credentials are written to the shared store.
#[derive(Debug)]
pub struct MockPairingSession {
    device_id: DeviceId,
    service: String,
    remote_name: String,
    storage: SharedCredentialStore,
    stats: Arc<MockStats>,
    behavior: Arc<Behavior>,
    entered_pin: Option<String>,
    paired: bool,
}

impl MockPairingSession {
    async fn stall(&self) {
        if Behavior::is(&self.behavior.hang_pairing) {
            futures::future::pending::<()>().await;
        }
    }
}

/// Store key under which a begun handshake records the remote's identity
pub fn client_service(service: &str) -> String {
    format!("{}.client", service)
}

#[async_trait]
impl PairingSession for MockPairingSession {
    async fn begin(&mut self) -> Result<()> {
        self.stall().await;
        if Behavior::is(&self.behavior.fail_begin) {
            return Err(DeviceError::pairing("device refused to start pairing"));
        }
        self.storage.set_credentials(
            &self.device_id,
            &client_service(&self.service),
            &self.remote_name,
        )
    }

    fn pin(&mut self, pin: &str) -> Result<()> {
        self.entered_pin = Some(pin.to_string());
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.stall().await;
        let expected = self
            .behavior
            .expected_pin
            .lock()
            .expect("lock poisoned")
            .clone();
        self.paired = self.entered_pin.as_deref() == Some(expected.as_str());

        if self.paired {
            self.storage.set_credentials(
                &self.device_id,
                &self.service,
                &format!("{}:{}", self.remote_name, expected),
            )?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn device_provides_pin(&self) -> bool {
        Behavior::is(&self.behavior.device_provides_pin)
    }

    fn has_paired(&self) -> bool {
        self.paired
    }
}
