/*!
 * Scoped device connections.
 *
 * [`ConnectionScope::run_exclusive`] opens one connection, hands it to one
 * operation and closes it afterwards on every exit path: normal return,
 * operation failure, and cancellation of the calling task. There are no
 * retries here; callers that want another attempt call it again.
 */
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn, Instrument};

use mediahub_core::{logging, types::DeviceId, utils::spawn_and_log};

use crate::device::{DeviceHandle, Result};
use crate::protocol::{Connection, DeviceProtocol};
use crate::storage::SharedCredentialStore;

/// Closes its connection exactly once: explicitly, or on drop if the
/// owning future was abandoned mid-operation.
struct ConnectionGuard {
    connection: Option<Arc<dyn Connection>>,
    device_id: DeviceId,
}

impl ConnectionGuard {
    fn new(connection: Arc<dyn Connection>, device_id: DeviceId) -> Self {
        Self {
            connection: Some(connection),
            device_id,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(device_id = %self.device_id, "Operation abandoned, closing connection in background");
            spawn_and_log("close-abandoned-connection", async move {
                connection.close().await
            });
        }
    }
}

/// Runs single operations against devices over short-lived connections
#[derive(Debug, Clone)]
pub struct ConnectionScope {
    protocol: Arc<dyn DeviceProtocol>,
    storage: SharedCredentialStore,
}

impl ConnectionScope {
    /// Create a scope connecting through `protocol` with credentials from `storage`
    pub fn new(protocol: Arc<dyn DeviceProtocol>, storage: SharedCredentialStore) -> Self {
        Self { protocol, storage }
    }

    /// Connect to `handle`, run `operation` on the connection, then close it
    ///
    /// # Errors
    ///
    /// [`DeviceError::ConnectionFailed`](crate::device::DeviceError::ConnectionFailed)
    /// if the connection cannot be opened, in which case `operation` never
    /// runs. Otherwise the operation's own error. A failure while closing is
    /// logged and never replaces the operation's outcome.
    pub async fn run_exclusive<T, F, Fut>(&self, handle: &DeviceHandle, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let device_id = handle.id().clone();
        let span = logging::device_span("run_exclusive", device_id.as_str());

        async move {
            let connection: Arc<dyn Connection> = self
                .protocol
                .connect(handle, &self.storage)
                .await
                .map_err(|e| e.into_connection_failure(&device_id))?
                .into();
            debug!("Connection opened");

            let mut guard = ConnectionGuard::new(connection.clone(), device_id);
            let outcome = operation(connection).await;

            match guard.close().await {
                Ok(()) => debug!("Connection closed"),
                Err(e) if outcome.is_ok() => {
                    warn!("Closing connection after successful operation failed: {}", e)
                }
                Err(e) => warn!("Closing connection after failed operation failed: {}", e),
            }

            outcome
        }
        .instrument(span)
        .await
    }
}
