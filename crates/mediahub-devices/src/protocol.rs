/*!
 * Device protocol contract.
 *
 * The wire protocol spoken with media devices lives in an external library.
 * This module defines the seam the driver consumes: discovery, connecting,
 * remote-control operations on an open connection, and the pairing handshake.
 * Every method that touches the network is async; implementations enforce
 * their own timeouts and report them as errors.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mediahub_core::types::DeviceId;

use crate::device::{DeviceHandle, Result};
use crate::storage::{CredentialStore, SharedCredentialStore};

/// Navigation and playback keys of a media remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteKey {
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Select / OK
    Select,
    /// Play or pause the current media
    PlayPause,
    /// Menu, used as "back"
    Menu,
    /// Home screen
    Home,
}

/// Protocol trait implemented by the device-protocol library
#[async_trait]
pub trait DeviceProtocol: Send + Sync + Debug {
    /// Get the protocol name
    fn name(&self) -> &'static str;

    /// Scan the network, optionally only for the device with `filter` as identifier
    ///
    /// An empty result is not an error.
    async fn discover(&self, filter: Option<&DeviceId>) -> Result<Vec<DeviceHandle>>;

    /// Open a connection to a discovered device, using stored credentials
    async fn connect(
        &self,
        handle: &DeviceHandle,
        storage: &CredentialStore,
    ) -> Result<Box<dyn Connection>>;

    /// Open a pairing session against `service` of a discovered device
    ///
    /// The session writes the credentials it negotiates into `storage`.
    async fn pair(
        &self,
        handle: &DeviceHandle,
        service: &str,
        storage: SharedCredentialStore,
        remote_name: &str,
    ) -> Result<Box<dyn PairingSession>>;
}

/// An open protocol connection to one device
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Wake the device
    async fn turn_on(&self) -> Result<()>;

    /// Put the device to sleep
    async fn turn_off(&self) -> Result<()>;

    /// Press a remote key
    async fn press(&self, key: RemoteKey) -> Result<()>;

    /// Raise the volume by one step
    async fn volume_up(&self) -> Result<()>;

    /// Lower the volume by one step
    async fn volume_down(&self) -> Result<()>;

    /// Close the connection and release its sockets
    async fn close(&self) -> Result<()>;
}

/// An in-progress pairing handshake with one device
#[async_trait]
pub trait PairingSession: Send + Sync + Debug {
    /// Start the handshake; the PIN is shown after this returns
    async fn begin(&mut self) -> Result<()>;

    /// Provide the PIN entered by the user
    fn pin(&mut self, pin: &str) -> Result<()>;

    /// Complete the handshake with the provided PIN
    async fn finish(&mut self) -> Result<()>;

    /// Release the session
    async fn close(&mut self) -> Result<()>;

    /// Whether the device displays the PIN (as opposed to expecting one)
    fn device_provides_pin(&self) -> bool;

    /// Whether the handshake produced usable credentials
    fn has_paired(&self) -> bool;
}
