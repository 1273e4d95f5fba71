/*!
 * Two-phase pairing with media devices.
 *
 * The hub starts pairing, shows or asks for a PIN, and later finalizes the
 * attempt with the PIN in a separate call. Between the two calls the open
 * handshake is held under a fresh request ID for a limited time. Attempts
 * are independent of each other and can be finalized only once; attempts
 * that expire or are pushed out by newer ones have their session closed in
 * the background.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};

use mediahub_core::{
    cache::ExpiringCache,
    config::PairingConfig,
    logging,
    types::{DeviceId, PairingRequestId},
    utils::spawn_and_log,
};
use mediahub_devices::{
    DeviceError, DeviceInfo, PairingSession, Result as DeviceResult, SharedCredentialStore,
    SharedDeviceRegistry,
};

use crate::error::{Error, Result};

/// Lifecycle of a pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingState {
    /// The device is being located
    Started,
    /// The handshake is open and waits for the PIN
    AwaitingCredentials,
    /// The handshake completed, successfully or not
    Finished,
    /// The attempt ended before a handshake could be held
    Failed,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingState::Started => write!(f, "started"),
            PairingState::AwaitingCredentials => write!(f, "awaiting_credentials"),
            PairingState::Finished => write!(f, "finished"),
            PairingState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of starting a pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStart {
    /// A handshake is open under `request_id`
    Started {
        /// The ID to finalize the attempt with
        request_id: PairingRequestId,
        /// Whether the device shows the PIN (as opposed to expecting one)
        device_provides_pin: bool,
    },
    /// The device could not be found; no attempt was created
    DeviceUnreachable,
}

impl PairingStart {
    /// The request ID, if an attempt was created
    pub fn request_id(&self) -> Option<PairingRequestId> {
        match self {
            PairingStart::Started { request_id, .. } => Some(*request_id),
            PairingStart::DeviceUnreachable => None,
        }
    }

    /// The hub's `(request ID, device provides PIN)` pair; `(None, false)`
    /// when the device was unreachable
    pub fn into_parts(self) -> (Option<PairingRequestId>, bool) {
        match self {
            PairingStart::Started {
                request_id,
                device_provides_pin,
            } => (Some(request_id), device_provides_pin),
            PairingStart::DeviceUnreachable => (None, false),
        }
    }
}

/// An open handshake; closed in the background if dropped before
/// [`close`](Self::close), e.g. when the request holding it is abandoned.
#[derive(Debug)]
struct PairingAttempt {
    device_id: DeviceId,
    session: Option<Box<dyn PairingSession>>,
}

impl PairingAttempt {
    fn new(device_id: DeviceId, session: Box<dyn PairingSession>) -> Self {
        Self {
            device_id,
            session: Some(session),
        }
    }

    fn session(&mut self) -> DeviceResult<&mut (dyn PairingSession + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| DeviceError::pairing("pairing session already closed"))
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(device_id = %self.device_id, "Closing pairing session failed: {}", e);
            }
        }
    }
}

impl Drop for PairingAttempt {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(device_id = %self.device_id, "Pairing attempt dropped, closing its session in background");
            spawn_and_log("close-abandoned-pairing", async move { session.close().await });
        }
    }
}

/// Tracks open pairing handshakes between the start and finalize calls
#[derive(Debug)]
pub struct PairingCoordinator {
    registry: SharedDeviceRegistry,
    storage: SharedCredentialStore,
    service: String,
    attempts: Mutex<ExpiringCache<PairingRequestId, PairingAttempt>>,
}

impl PairingCoordinator {
    /// Create a coordinator from the `[pairing]` configuration section
    pub fn new(
        registry: SharedDeviceRegistry,
        storage: SharedCredentialStore,
        config: &PairingConfig,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            storage,
            service: config.service.clone(),
            attempts: Mutex::new(ExpiringCache::new(
                config.max_attempts,
                config.attempt_ttl(),
            )?),
        })
    }

    /// Start pairing with `device` on behalf of the remote called `remote_name`
    ///
    /// Returns [`PairingStart::DeviceUnreachable`] instead of an error when
    /// the device is not on the network. Otherwise opens a handshake, stores
    /// the credential state and keeps the handshake under a new request ID.
    ///
    /// # Errors
    ///
    /// A failed scan, or a handshake that could not be opened or begun. The
    /// session is closed and no attempt is stored in that case.
    pub async fn start_pairing(&self, device: &DeviceInfo, remote_name: &str) -> Result<PairingStart> {
        let span = logging::pairing_span("start_pairing", None);

        async {
            info!(device_id = %device.id, state = %PairingState::Started, "Pairing started");

            let handle = match self.registry.resolve(&device.id).await {
                Ok(handle) => handle,
                Err(e) if e.is_not_found() => {
                    info!(device_id = %device.id, state = %PairingState::Failed, "Device unreachable, no pairing attempt created");
                    return Ok(PairingStart::DeviceUnreachable);
                }
                Err(e) => {
                    info!(device_id = %device.id, state = %PairingState::Failed, "Device lookup failed: {}", e);
                    return Err(e.into());
                }
            };

            let session = self
                .registry
                .discoverer()
                .protocol()
                .pair(&handle, &self.service, self.storage.clone(), remote_name)
                .await?;
            let mut attempt = PairingAttempt::new(device.id.clone(), session);

            if let Err(e) = self.begin(attempt.session()?).await {
                attempt.close().await;
                info!(device_id = %device.id, state = %PairingState::Failed, "Pairing could not begin: {}", e);
                return Err(e.into());
            }

            let request_id = PairingRequestId::generate();
            let device_provides_pin = attempt.session()?.device_provides_pin();

            let displaced = {
                let mut attempts = self.attempts.lock().await;
                let mut displaced = attempts.purge_expired();
                displaced.extend(attempts.insert(request_id, attempt));
                displaced
            };
            retire(displaced);

            info!(
                device_id = %device.id,
                request_id = %request_id,
                device_provides_pin,
                state = %PairingState::AwaitingCredentials,
                "Waiting for pairing credentials"
            );
            Ok(PairingStart::Started {
                request_id,
                device_provides_pin,
            })
        }
        .instrument(span)
        .await
    }

    /// Complete the attempt `request_id` with the PIN in `credentials`
    ///
    /// The attempt is consumed by this call whatever its outcome. Returns
    /// whether the device accepted the PIN.
    ///
    /// # Errors
    ///
    /// [`Error::PairingRequestNotFound`] for an unknown, expired or already
    /// finalized request ID; otherwise the failure of the handshake or of
    /// saving the credentials.
    pub async fn finalize_pairing(
        &self,
        request_id: &str,
        credentials: &str,
        device_provides_pin: bool,
    ) -> Result<bool> {
        let span = logging::pairing_span("finalize_pairing", Some(request_id));

        async {
            let mut attempt = self
                .take(request_id)
                .await
                .ok_or_else(|| Error::PairingRequestNotFound(request_id.to_string()))?;
            let device_id = attempt.device_id.clone();

            let reported = attempt.session()?.device_provides_pin();
            if reported != device_provides_pin {
                warn!(
                    device_id = %device_id,
                    "Hub expected device_provides_pin = {}, session reports {}",
                    device_provides_pin,
                    reported
                );
            }

            let outcome = Self::complete(attempt.session()?, credentials).await;
            let paired = outcome.is_ok() && attempt.session()?.has_paired();
            attempt.close().await;
            if let Err(e) = outcome {
                info!(device_id = %device_id, state = %PairingState::Failed, "Pairing handshake failed: {}", e);
                return Err(e.into());
            }

            self.storage.save().await?;

            info!(device_id = %device_id, paired, state = %PairingState::Finished, "Pairing finished");
            Ok(paired)
        }
        .instrument(span)
        .await
    }

    /// Number of attempts waiting to be finalized, including expired ones
    /// not yet cleaned up
    pub async fn pending_len(&self) -> usize {
        self.attempts.lock().await.len()
    }

    /// Whether `request_id` can still be finalized
    pub async fn is_pending(&self, request_id: &PairingRequestId) -> bool {
        self.attempts.lock().await.contains(request_id)
    }

    async fn begin(&self, session: &mut dyn PairingSession) -> DeviceResult<()> {
        session.begin().await?;
        self.storage.save().await?;
        Ok(())
    }

    async fn complete(session: &mut dyn PairingSession, credentials: &str) -> DeviceResult<()> {
        session.pin(credentials)?;
        session.finish().await
    }

    async fn take(&self, request_id: &str) -> Option<PairingAttempt> {
        let id: PairingRequestId = request_id.parse().ok()?;
        let (attempt, expired) = {
            let mut attempts = self.attempts.lock().await;
            let expired = attempts.purge_expired();
            (attempts.remove(&id), expired)
        };
        retire(expired);
        attempt
    }
}

/// Drop attempts that can no longer be finalized; their sessions close in
/// the background
fn retire(attempts: Vec<(PairingRequestId, PairingAttempt)>) {
    for (request_id, attempt) in attempts {
        warn!(
            request_id = %request_id,
            device_id = %attempt.device_id,
            "Pairing attempt abandoned, closing its session"
        );
        drop(attempt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use mediahub_devices::mock::{client_service, MockProtocol, DEFAULT_PIN};
    use mediahub_devices::{CredentialStore, DeviceError, DeviceHandle, DeviceRegistry};
    use tempfile::TempDir;
    use tokio::time::{advance, timeout};
    use tokio_test::assert_ok;

    struct Fixture {
        protocol: Arc<MockProtocol>,
        storage: SharedCredentialStore,
        coordinator: PairingCoordinator,
        dir: TempDir,
    }

    async fn fixture(config: PairingConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let protocol = Arc::new(
            MockProtocol::new()
                .with_device(DeviceHandle::new("atv-1", "Living Room", "AppleTV6,2", "10.0.0.12"))
                .with_device(DeviceHandle::new("atv-2", "Bedroom", "AppleTV11,1", "10.0.0.14")),
        );
        let storage = CredentialStore::open(dir.path().join("appletv.conf"))
            .await
            .unwrap();
        let registry = Arc::new(
            DeviceRegistry::new(protocol.clone(), 20, Duration::from_secs(1200)).unwrap(),
        );
        let coordinator = PairingCoordinator::new(registry, storage.clone(), &config).unwrap();

        Fixture {
            protocol,
            storage,
            coordinator,
            dir,
        }
    }

    fn living_room() -> DeviceInfo {
        DeviceInfo::new("atv-1", "Living Room")
    }

    async fn started(fixture: &Fixture, device: &DeviceInfo) -> PairingRequestId {
        fixture
            .coordinator
            .start_pairing(device, "Hub Remote")
            .await
            .unwrap()
            .request_id()
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_pairing_round_trip_persists_credentials() {
        let fixture = fixture(PairingConfig::default()).await;

        let start = fixture
            .coordinator
            .start_pairing(&living_room(), "Hub Remote")
            .await
            .unwrap();
        let (request_id, device_provides_pin) = start.into_parts();
        let request_id = request_id.unwrap();
        assert!(device_provides_pin);
        assert!(fixture.coordinator.is_pending(&request_id).await);

        let paired = fixture
            .coordinator
            .finalize_pairing(&request_id.to_string(), DEFAULT_PIN, true)
            .await
            .unwrap();

        assert!(paired);
        assert_eq!(fixture.protocol.stats().sessions_closed(), 1);
        assert_eq!(fixture.coordinator.pending_len().await, 0);

        // The credentials reached the file, not just memory.
        let reloaded = CredentialStore::open(fixture.dir.path().join("appletv.conf"))
            .await
            .unwrap();
        let stored = assert_ok!(reloaded.credentials(&DeviceId::new("atv-1"), "companion"));
        assert_eq!(stored.as_deref(), Some("Hub Remote:1234"));
        assert!(!fixture.storage.is_dirty().unwrap());
    }

    #[tokio::test]
    async fn test_wrong_pin_is_not_paired() {
        let fixture = fixture(PairingConfig::default()).await;
        let request_id = started(&fixture, &living_room()).await;

        let paired = fixture
            .coordinator
            .finalize_pairing(&request_id.to_string(), "0000", true)
            .await
            .unwrap();

        assert!(!paired);
        assert_eq!(fixture.protocol.stats().sessions_closed(), 1);
        assert_eq!(
            fixture
                .storage
                .credentials(&DeviceId::new("atv-1"), "companion")
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_second_finalize_is_not_found() {
        let fixture = fixture(PairingConfig::default()).await;
        let request_id = started(&fixture, &living_room()).await.to_string();

        fixture
            .coordinator
            .finalize_pairing(&request_id, "0000", true)
            .await
            .unwrap();
        let err = fixture
            .coordinator
            .finalize_pairing(&request_id, DEFAULT_PIN, true)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PairingRequestNotFound(ref id) if *id == request_id));
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_request_is_not_found() {
        let fixture = fixture(PairingConfig::default()).await;

        for request_id in [PairingRequestId::generate().to_string(), "garbage".to_string()] {
            let err = fixture
                .coordinator
                .finalize_pairing(&request_id, DEFAULT_PIN, true)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::PairingRequestNotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_unreachable_device_is_soft_failure() {
        let fixture = fixture(PairingConfig::default()).await;

        let start = fixture
            .coordinator
            .start_pairing(&DeviceInfo::new("ghost", "Ghost"), "Hub Remote")
            .await
            .unwrap();

        assert_eq!(start, PairingStart::DeviceUnreachable);
        assert_eq!(start.into_parts(), (None, false));
        assert_eq!(fixture.protocol.stats().pair_calls(), 0);
        assert_eq!(fixture.coordinator.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_scan_failure_is_an_error() {
        let fixture = fixture(PairingConfig::default()).await;
        fixture.protocol.set_fail_discovery(true);

        let err = fixture
            .coordinator
            .start_pairing(&living_room(), "Hub Remote")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Device(DeviceError::DiscoveryFailed(_))));
    }

    #[tokio::test]
    async fn test_start_flushes_handshake_state() {
        let fixture = fixture(PairingConfig::default()).await;
        started(&fixture, &living_room()).await;

        assert!(!fixture.storage.is_dirty().unwrap());
        let reloaded = CredentialStore::open(fixture.dir.path().join("appletv.conf"))
            .await
            .unwrap();
        let client = reloaded
            .credentials(&DeviceId::new("atv-1"), &client_service("companion"))
            .unwrap();
        assert_eq!(client.as_deref(), Some("Hub Remote"));
    }

    #[tokio::test]
    async fn test_abandoned_start_closes_session() {
        let fixture = fixture(PairingConfig::default()).await;
        fixture.protocol.set_hang_pairing(true);

        let device = living_room();
        let start = fixture.coordinator.start_pairing(&device, "Hub Remote");
        assert!(timeout(Duration::from_millis(20), start).await.is_err());

        fixture.protocol.stats().wait_for_sessions_closed(1).await;
        assert_eq!(fixture.coordinator.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_abandoned_finalize_closes_session() {
        let fixture = fixture(PairingConfig::default()).await;
        let request_id = started(&fixture, &living_room()).await.to_string();
        fixture.protocol.set_hang_pairing(true);

        let finalize = fixture
            .coordinator
            .finalize_pairing(&request_id, DEFAULT_PIN, true);
        assert!(timeout(Duration::from_millis(20), finalize).await.is_err());

        fixture.protocol.stats().wait_for_sessions_closed(1).await;
        let err = fixture
            .coordinator
            .finalize_pairing(&request_id, DEFAULT_PIN, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PairingRequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_begin_closes_session_and_stores_nothing() {
        let fixture = fixture(PairingConfig::default()).await;
        fixture.protocol.set_fail_begin(true);

        let err = fixture
            .coordinator
            .start_pairing(&living_room(), "Hub Remote")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Device(DeviceError::Pairing(_))));
        assert_eq!(fixture.protocol.stats().sessions_closed(), 1);
        assert_eq!(fixture.coordinator.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_are_independent() {
        let fixture = fixture(PairingConfig::default()).await;
        fixture.protocol.set_device_provides_pin(false);

        let first = started(&fixture, &living_room()).await;
        let second = started(&fixture, &DeviceInfo::new("atv-2", "Bedroom")).await;
        assert_ne!(first, second);

        assert!(fixture
            .coordinator
            .finalize_pairing(&second.to_string(), DEFAULT_PIN, false)
            .await
            .unwrap());
        assert!(fixture.coordinator.is_pending(&first).await);
        assert!(!fixture.coordinator.is_pending(&second).await);

        let paired_with = |id: &str| {
            fixture
                .storage
                .credentials(&DeviceId::new(id), "companion")
                .unwrap()
        };
        assert_eq!(paired_with("atv-1"), None);
        assert_eq!(paired_with("atv-2").as_deref(), Some("Hub Remote:1234"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_attempt_is_not_found_and_closed() {
        let fixture = fixture(PairingConfig::default()).await;
        let request_id = started(&fixture, &living_room()).await;

        advance(Duration::from_secs(301)).await;

        let err = fixture
            .coordinator
            .finalize_pairing(&request_id.to_string(), DEFAULT_PIN, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PairingRequestNotFound(_)));
        fixture.protocol.stats().wait_for_sessions_closed(1).await;
    }

    #[tokio::test]
    async fn test_oldest_attempt_is_dropped_when_full() {
        let fixture = fixture(PairingConfig {
            max_attempts: 2,
            ..PairingConfig::default()
        })
        .await;

        let oldest = started(&fixture, &living_room()).await;
        started(&fixture, &living_room()).await;
        started(&fixture, &living_room()).await;

        assert_eq!(fixture.coordinator.pending_len().await, 2);
        assert!(!fixture.coordinator.is_pending(&oldest).await);
        fixture.protocol.stats().wait_for_sessions_closed(1).await;
    }
}
