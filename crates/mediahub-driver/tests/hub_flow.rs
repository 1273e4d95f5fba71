//! Drives the hub contract end to end against the mock protocol.

use std::sync::Arc;

use mediahub_core::config::{Config, ConfigBuilder};
use mediahub_core::types::DeviceId;
use mediahub_devices::mock::{MockProtocol, RecordedAction, DEFAULT_PIN};
use mediahub_devices::{CredentialStore, DeviceHandle, DeviceInfo, DeviceRegistry, RemoteKey};
use mediahub_driver::{
    ids, DeviceDriverDescriptor, Error, IconSet, MediaDriverDescriptor, PairingStart,
};
use tempfile::TempDir;

fn protocol() -> Arc<MockProtocol> {
    Arc::new(
        MockProtocol::new()
            .with_device(DeviceHandle::new("atv-1", "Living Room", "AppleTV6,2", "10.0.0.12"))
            .with_device(DeviceHandle::new("atv-2", "Bedroom", "AppleTV11,1", "10.0.0.14"))
            .with_device(DeviceHandle::new("hp-1", "Kitchen", "AudioAccessory5,1", "10.0.0.13")),
    )
}

fn config(dir: &TempDir) -> Config {
    let file = dir.path().join("driver.toml");
    std::fs::write(&file, "[family]\nname = \"appletv\"\n\n[execution]\nretries = 0\n").unwrap();

    ConfigBuilder::new()
        .with_config_file(&file)
        .with_config_dir(dir.path())
        .build()
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn pair_then_control_a_device() {
    let dir = tempfile::tempdir().unwrap();
    let protocol = protocol();
    let descriptor = MediaDriverDescriptor::new(protocol.clone(), config(&dir), IconSet::empty())
        .await
        .unwrap();

    let devices = descriptor.list_devices().await.unwrap();
    assert_eq!(
        devices,
        vec![
            DeviceInfo::new("atv-1", "Living Room"),
            DeviceInfo::new("atv-2", "Bedroom"),
        ]
    );

    let (request_id, device_provides_pin) = descriptor
        .start_pairing(&devices[0], "Hub Remote")
        .await
        .unwrap()
        .into_parts();
    let request_id = request_id.unwrap().to_string();
    assert!(device_provides_pin);

    let paired = descriptor
        .finalize_pairing(&request_id, DEFAULT_PIN, device_provides_pin)
        .await
        .unwrap();
    assert!(paired);

    let again = descriptor
        .finalize_pairing(&request_id, DEFAULT_PIN, device_provides_pin)
        .await
        .unwrap_err();
    assert!(matches!(again, Error::PairingRequestNotFound(_)));

    let driver = descriptor
        .create_device_instance(&DeviceId::new("atv-1"))
        .await
        .unwrap();
    for id in [ids::TURN_ON, ids::SELECT, ids::VOLUME_UP] {
        let command = driver.command(id).unwrap();
        driver.execute(command).await.unwrap();
    }

    let stats = protocol.stats();
    assert_eq!(
        stats.actions(),
        vec![
            RecordedAction::TurnOn,
            RecordedAction::Press(RemoteKey::Select),
            RecordedAction::VolumeUp,
        ]
    );
    assert_eq!(stats.connect_calls(), 3);
    assert_eq!(stats.close_calls(), 3);

    let missing = driver.command(99).unwrap_err();
    assert!(matches!(
        missing,
        Error::CommandNotFound { ref device_name, command_id: 99 } if device_name == "Living Room"
    ));

    // A second process sees the paired credentials.
    let reloaded = CredentialStore::open(dir.path().join("appletv.conf"))
        .await
        .unwrap();
    assert!(reloaded
        .credentials(&DeviceId::new("atv-1"), "companion")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unreachable_device_cannot_be_paired_or_controlled() {
    let dir = tempfile::tempdir().unwrap();
    let protocol = protocol();
    let descriptor = MediaDriverDescriptor::new(protocol.clone(), config(&dir), IconSet::empty())
        .await
        .unwrap();

    let start = descriptor
        .start_pairing(&DeviceInfo::new("ghost", "Ghost"), "Hub Remote")
        .await
        .unwrap();
    assert_eq!(start, PairingStart::DeviceUnreachable);
    assert_eq!(protocol.stats().pair_calls(), 0);

    let err = descriptor
        .create_device_instance(&DeviceId::new("ghost"))
        .await
        .unwrap_err();
    assert!(err.is_device_not_found());
}

#[tokio::test]
async fn device_going_offline_fails_commands_without_leaking_connections() {
    let dir = tempfile::tempdir().unwrap();
    let protocol = protocol();
    let descriptor = MediaDriverDescriptor::new(protocol.clone(), config(&dir), IconSet::empty())
        .await
        .unwrap();
    let driver = descriptor
        .create_device_instance(&DeviceId::new("atv-2"))
        .await
        .unwrap();

    protocol.set_fail_operations(true);
    let err = driver
        .execute(driver.command(ids::HOME).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandExecutionFailed { command_id: ids::HOME, .. }));

    protocol.set_fail_operations(false);
    protocol.set_fail_connect(true);
    let err = driver
        .execute(driver.command(ids::BACK).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandExecutionFailed { command_id: ids::BACK, .. }));

    let stats = protocol.stats();
    assert_eq!(stats.connect_calls(), 2);
    assert_eq!(stats.close_calls(), 1);
}

#[tokio::test]
async fn descriptors_of_one_family_share_registry_and_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let protocol = protocol();
    let config = config(&dir);
    let registry = Arc::new(DeviceRegistry::from_config(protocol.clone(), &config.discovery).unwrap());
    let storage = CredentialStore::open(config.credential_store_path())
        .await
        .unwrap();

    let first = MediaDriverDescriptor::with_registry(
        registry.clone(),
        storage.clone(),
        config.clone(),
        IconSet::empty(),
    )
    .unwrap();
    let second =
        MediaDriverDescriptor::with_registry(registry, storage, config, IconSet::empty()).unwrap();

    first.get_device(&DeviceId::new("atv-1")).await.unwrap();
    second.get_device(&DeviceId::new("atv-1")).await.unwrap();
    assert_eq!(protocol.stats().discover_calls(), 1);

    for (descriptor, device) in [
        (&first, DeviceInfo::new("atv-1", "Living Room")),
        (&second, DeviceInfo::new("atv-2", "Bedroom")),
    ] {
        let (request_id, device_provides_pin) = descriptor
            .start_pairing(&device, "Hub Remote")
            .await
            .unwrap()
            .into_parts();
        assert!(descriptor
            .finalize_pairing(&request_id.unwrap().to_string(), DEFAULT_PIN, device_provides_pin)
            .await
            .unwrap());
    }

    // Neither pairing overwrote the other on disk.
    let reloaded = CredentialStore::open(dir.path().join("appletv.conf"))
        .await
        .unwrap();
    for id in ["atv-1", "atv-2"] {
        let stored = reloaded.credentials(&DeviceId::new(id), "companion").unwrap();
        assert_eq!(stored.as_deref(), Some("Hub Remote:1234"), "{id}");
    }
}
