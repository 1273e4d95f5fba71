/*!
 * Remote-control commands offered by a media device.
 *
 * Every command has a stable numeric ID, a display title, an icon and the
 * remote operation it performs. The table is fixed when the driver is built
 * and shared read-only by every device instance; a [`CommandCatalog`] binds
 * it to one device and routes execution through the device registry and a
 * scoped connection.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument};

use mediahub_core::{config::ExecutionConfig, logging, types::DeviceId, utils::with_retry};
use mediahub_devices::{
    Connection, ConnectionScope, DeviceInfo, RemoteKey, Result as DeviceResult,
    SharedDeviceRegistry,
};

use crate::error::{Error, Result};

/// Numeric command identifier, stable across versions
pub type CommandId = u32;

/// Command IDs of the standard media remote
pub mod ids {
    use super::CommandId;

    /// Wake the device
    pub const TURN_ON: CommandId = 1;
    /// Put the device to sleep
    pub const TURN_OFF: CommandId = 2;
    /// Up arrow
    pub const UP: CommandId = 3;
    /// Right arrow
    pub const RIGHT: CommandId = 4;
    /// Down arrow
    pub const DOWN: CommandId = 5;
    /// Left arrow
    pub const LEFT: CommandId = 6;
    /// Select / OK
    pub const SELECT: CommandId = 7;
    /// Play or pause
    pub const PLAY_PAUSE: CommandId = 8;
    /// Back (menu key)
    pub const BACK: CommandId = 9;
    /// Volume up
    pub const VOLUME_UP: CommandId = 10;
    /// Volume down
    pub const VOLUME_DOWN: CommandId = 11;
    /// Home screen
    pub const HOME: CommandId = 12;
}

/// The operation a command performs on an open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteOperation {
    /// Wake the device
    TurnOn,
    /// Put the device to sleep
    TurnOff,
    /// Press a remote key
    Press(RemoteKey),
    /// Raise the volume
    VolumeUp,
    /// Lower the volume
    VolumeDown,
}

impl RemoteOperation {
    /// Perform the operation on `connection`
    pub async fn apply(self, connection: &dyn Connection) -> DeviceResult<()> {
        match self {
            RemoteOperation::TurnOn => connection.turn_on().await,
            RemoteOperation::TurnOff => connection.turn_off().await,
            RemoteOperation::Press(key) => connection.press(key).await,
            RemoteOperation::VolumeUp => connection.volume_up().await,
            RemoteOperation::VolumeDown => connection.volume_down().await,
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOperation::Press(key) => write!(f, "press {:?}", key),
            other => write!(f, "{:?}", other),
        }
    }
}

/// (id, title, icon name, operation) of every standard command, in hub order
const STANDARD_COMMANDS: &[(CommandId, &str, &str, RemoteOperation)] = &[
    (ids::TURN_ON, "On", "turn_on", RemoteOperation::TurnOn),
    (ids::TURN_OFF, "Off", "turn_off", RemoteOperation::TurnOff),
    (ids::UP, "Up", "up", RemoteOperation::Press(RemoteKey::Up)),
    (ids::RIGHT, "Right", "right", RemoteOperation::Press(RemoteKey::Right)),
    (ids::DOWN, "Down", "down", RemoteOperation::Press(RemoteKey::Down)),
    (ids::LEFT, "Left", "left", RemoteOperation::Press(RemoteKey::Left)),
    (ids::SELECT, "Select", "ok", RemoteOperation::Press(RemoteKey::Select)),
    (ids::PLAY_PAUSE, "Play/Pause", "play_pause", RemoteOperation::Press(RemoteKey::PlayPause)),
    (ids::BACK, "Back", "back", RemoteOperation::Press(RemoteKey::Menu)),
    (ids::VOLUME_UP, "Volume +", "volume_up", RemoteOperation::VolumeUp),
    (ids::VOLUME_DOWN, "Volume -", "volume_down", RemoteOperation::VolumeDown),
    (ids::HOME, "Home", "home", RemoteOperation::Press(RemoteKey::Home)),
];

/// Icon images by icon name
///
/// Loading the images is up to the caller; commands whose icon is missing
/// get an empty image.
#[derive(Debug, Clone, Default)]
pub struct IconSet {
    icons: HashMap<String, Bytes>,
}

impl IconSet {
    /// An icon set without any images
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add the image for `name`
    pub fn with_icon<S: Into<String>, B: Into<Bytes>>(mut self, name: S, image: B) -> Self {
        self.icons.insert(name.into(), image.into());
        self
    }

    /// The image for `name`, empty if unknown
    pub fn icon(&self, name: &str) -> Bytes {
        self.icons.get(name).cloned().unwrap_or_default()
    }

    /// Number of images in the set
    pub fn len(&self) -> usize {
        self.icons.len()
    }

    /// Whether the set has no images
    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

/// One command a device offers to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    id: CommandId,
    title: String,
    icon: Bytes,
    operation: RemoteOperation,
}

impl CommandDescriptor {
    /// Create a command descriptor
    pub fn new<S: Into<String>>(
        id: CommandId,
        title: S,
        icon: Bytes,
        operation: RemoteOperation,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            icon,
            operation,
        }
    }

    /// The command ID
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// The display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The icon image
    pub fn icon(&self) -> &Bytes {
        &self.icon
    }

    /// The bound operation
    pub fn operation(&self) -> RemoteOperation {
        self.operation
    }
}

/// Build the standard media-remote command table
pub fn standard_commands(icons: &IconSet) -> Arc<[CommandDescriptor]> {
    STANDARD_COMMANDS
        .iter()
        .map(|&(id, title, icon, operation)| {
            CommandDescriptor::new(id, title, icons.icon(icon), operation)
        })
        .collect()
}

/// The commands of one device instance
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    device: DeviceInfo,
    commands: Arc<[CommandDescriptor]>,
    registry: SharedDeviceRegistry,
    scope: ConnectionScope,
    execution: ExecutionConfig,
}

impl CommandCatalog {
    /// Bind `commands` to `device`
    pub fn new(
        device: DeviceInfo,
        commands: Arc<[CommandDescriptor]>,
        registry: SharedDeviceRegistry,
        scope: ConnectionScope,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            device,
            commands,
            registry,
            scope,
            execution,
        }
    }

    /// The device these commands act on
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// All commands, in table order
    pub fn list_commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Look up a command by ID
    ///
    /// # Errors
    ///
    /// [`Error::CommandNotFound`] with the device name and requested ID.
    pub fn get_command(&self, command_id: CommandId) -> Result<&CommandDescriptor> {
        self.commands
            .iter()
            .find(|command| command.id == command_id)
            .ok_or_else(|| Error::CommandNotFound {
                device_name: self.device.name.clone(),
                command_id,
            })
    }

    /// Run `command` against the device
    ///
    /// Resolves the device, then performs the operation over a scoped
    /// connection. With `execution.retries` set, the whole sequence is
    /// attempted again after a failure.
    ///
    /// # Errors
    ///
    /// [`Error::CommandExecutionFailed`] wrapping the last failure.
    pub async fn execute(&self, command: &CommandDescriptor) -> Result<()> {
        let device_id = &self.device.id;
        let command_id = command.id;
        let operation = command.operation;
        let span = logging::device_span("execute", device_id.as_str());

        async move {
            debug!(command_id, title = %command.title, "Executing {}", operation);

            with_retry(self.execution.retries, self.execution.retry_delay(), move || {
                self.run_once(device_id, operation)
            })
            .await
            .map_err(|source| Error::CommandExecutionFailed {
                device_id: device_id.clone(),
                command_id,
                source,
            })?;

            info!(command_id, "Command executed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn run_once(&self, device_id: &DeviceId, operation: RemoteOperation) -> DeviceResult<()> {
        let handle = self.registry.resolve(device_id).await?;
        self.scope
            .run_exclusive(&handle, |connection| async move {
                operation.apply(connection.as_ref()).await
            })
            .await
    }
}
