/*!
 * Media-device driver.
 *
 * [`MediaDriverDescriptor`] wires the device layer together for one family:
 * it loads the family's credential file once, owns the device registry and
 * the pairing coordinator, and hands out [`MediaDeviceDriver`] instances
 * that share all of them. Descriptors of the same family may share the
 * registry and the credential store; the store must then be the same handle,
 * since each handle flushes its own copy of the file.
 */
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use mediahub_core::{config::Config, types::DeviceId};
use mediahub_devices::{
    model_prefix, ConnectionScope, CredentialStore, DeviceInfo, DeviceProtocol, DeviceRegistry,
    SharedCredentialStore, SharedDeviceRegistry,
};

use crate::catalog::{standard_commands, CommandCatalog, CommandDescriptor, CommandId, IconSet};
use crate::error::{Error, Result};
use crate::hub::{AuthenticationMethod, DeviceDriver, DeviceDriverDescriptor};
use crate::layout::RemoteLayout;
use crate::pairing::{PairingCoordinator, PairingStart};

/// Driver instance controlling one media device
#[derive(Debug)]
pub struct MediaDeviceDriver {
    catalog: CommandCatalog,
    layout: Arc<RemoteLayout>,
}

impl MediaDeviceDriver {
    /// Create a driver instance over `catalog`
    pub fn new(catalog: CommandCatalog, layout: Arc<RemoteLayout>) -> Self {
        Self { catalog, layout }
    }

    /// The command catalog of this device
    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }
}

#[async_trait]
impl DeviceDriver for MediaDeviceDriver {
    fn name(&self) -> &str {
        &self.catalog.device().name
    }

    fn device_id(&self) -> &DeviceId {
        &self.catalog.device().id
    }

    fn commands(&self) -> &[CommandDescriptor] {
        self.catalog.list_commands()
    }

    fn command(&self, command_id: CommandId) -> Result<&CommandDescriptor> {
        self.catalog.get_command(command_id)
    }

    async fn execute(&self, command: &CommandDescriptor) -> Result<()> {
        self.catalog.execute(command).await
    }

    fn remote_layout(&self) -> &RemoteLayout {
        &self.layout
    }

    fn is_device_ready(&self) -> bool {
        true
    }
}

/// Driver descriptor for a family of network media devices
#[derive(Debug)]
pub struct MediaDriverDescriptor {
    config: Config,
    registry: SharedDeviceRegistry,
    storage: SharedCredentialStore,
    scope: ConnectionScope,
    pairing: PairingCoordinator,
    commands: Arc<[CommandDescriptor]>,
    layout: Arc<RemoteLayout>,
}

impl MediaDriverDescriptor {
    /// Create a descriptor speaking `protocol`, with its own device registry
    /// and credential store
    ///
    /// Loads the credential file from the configuration directory.
    pub async fn new(
        protocol: Arc<dyn DeviceProtocol>,
        config: Config,
        icons: IconSet,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(DeviceRegistry::from_config(protocol, &config.discovery)?);
        let storage = CredentialStore::open(config.credential_store_path()).await?;
        Self::with_registry(registry, storage, config, icons)
    }

    /// Create a descriptor sharing an existing device registry and
    /// credential store
    ///
    /// # Errors
    ///
    /// An invalid configuration, or a store backed by another file than the
    /// family's credential file.
    pub fn with_registry(
        registry: SharedDeviceRegistry,
        storage: SharedCredentialStore,
        config: Config,
        icons: IconSet,
    ) -> Result<Self> {
        config.validate()?;

        let expected = config.credential_store_path();
        if storage.path() != expected {
            return Err(Error::validation(format!(
                "credential store {} is not the family's file {}",
                storage.path().display(),
                expected.display()
            )));
        }

        let scope = ConnectionScope::new(registry.discoverer().protocol().clone(), storage.clone());
        let pairing = PairingCoordinator::new(registry.clone(), storage.clone(), &config.pairing)?;

        info!(
            family = %config.family.name,
            driver_id = %config.family.driver_id,
            credentials = %storage.path().display(),
            "Driver descriptor ready"
        );

        Ok(Self {
            config,
            registry,
            storage,
            scope,
            pairing,
            commands: standard_commands(&icons),
            layout: Arc::new(RemoteLayout::standard()),
        })
    }

    /// The effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The device registry
    pub fn registry(&self) -> &SharedDeviceRegistry {
        &self.registry
    }

    /// The credential store
    pub fn storage(&self) -> &SharedCredentialStore {
        &self.storage
    }

    /// The pairing coordinator
    pub fn pairing(&self) -> &PairingCoordinator {
        &self.pairing
    }

    /// The command table shared by all device instances
    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Create the concrete driver instance for a device
    pub async fn create_media_device(&self, device_id: &DeviceId) -> Result<MediaDeviceDriver> {
        let device = self.get_device(device_id).await?;
        let catalog = CommandCatalog::new(
            device,
            self.commands.clone(),
            self.registry.clone(),
            self.scope.clone(),
            self.config.execution.clone(),
        );
        Ok(MediaDeviceDriver::new(catalog, self.layout.clone()))
    }
}

#[async_trait]
impl DeviceDriverDescriptor for MediaDriverDescriptor {
    fn driver_id(&self) -> Uuid {
        self.config.family.driver_id
    }

    fn display_name(&self) -> &str {
        &self.config.family.display_name
    }

    fn description(&self) -> &str {
        &self.config.family.description
    }

    fn authentication_method(&self) -> AuthenticationMethod {
        AuthenticationMethod::Pin
    }

    fn requires_pairing(&self) -> bool {
        true
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let predicate = model_prefix(self.config.family.model_prefix.clone());
        Ok(self.registry.list_available(predicate).await?)
    }

    async fn get_device(&self, device_id: &DeviceId) -> Result<DeviceInfo> {
        Ok(self.registry.resolve(device_id).await?.info())
    }

    async fn start_pairing(&self, device: &DeviceInfo, remote_name: &str) -> Result<PairingStart> {
        self.pairing.start_pairing(device, remote_name).await
    }

    async fn finalize_pairing(
        &self,
        request_id: &str,
        credentials: &str,
        device_provides_pin: bool,
    ) -> Result<bool> {
        self.pairing
            .finalize_pairing(request_id, credentials, device_provides_pin)
            .await
    }

    async fn create_device_instance(&self, device_id: &DeviceId) -> Result<Box<dyn DeviceDriver>> {
        Ok(Box::new(self.create_media_device(device_id).await?))
    }
}
