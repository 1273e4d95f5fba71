/*!
 * Utility functions and helpers for MediaHub.
 *
 * This module provides async helpers used by the driver layers.
 */
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Run a fallible async operation, retrying on failure
///
/// # Arguments
///
/// * `retries` - The number of additional attempts after the first one
/// * `delay` - The pause between two attempts
/// * `future_factory` - A function that creates a new future for each attempt
///
/// # Returns
///
/// The first successful result, or the error of the last attempt
///
/// No timeout is imposed here; each attempt runs until the operation itself
/// succeeds or fails.
pub async fn with_retry<F, Fut, T, E>(
    retries: usize,
    delay: Duration,
    mut future_factory: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        match future_factory().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!("Attempt {} failed: {}; retry {}/{}", attempt, e, attempt, retries);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                if retries > 0 {
                    warn!("All {} retries failed after {:?}", retries, start.elapsed());
                }
                return Err(e);
            }
        }
    }
}

/// Create a task that runs in the background and logs any errors
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `fut` - The future to run
///
/// Does nothing but log when called outside a Tokio runtime, for instance
/// from a destructor running after the runtime shut down.
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> Option<tokio::task::JoinHandle<()>>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let task_name = name.to_string();
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!("No runtime available for background task '{}'", task_name);
            return None;
        }
    };

    Some(handle.spawn(async move {
        match fut.await {
            Ok(_) => {
                debug!("Task '{}' completed successfully", task_name);
            }
            Err(e) => {
                warn!("Task '{}' failed: {}", task_name, e);
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::error::Error;

    #[tokio::test]
    async fn test_with_retry_success_first_try() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(3, Duration::ZERO, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_success_after_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(3, Duration::from_millis(250), move || {
            let current = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if current < 2 {
                    Err(Error::other("Intentional failure"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_zero_retries_is_single_attempt() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: std::result::Result<(), Error> = with_retry(0, Duration::ZERO, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::other("offline")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Other(msg)) if msg == "offline"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_with_retry_all_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: std::result::Result<(), Error> = with_retry(2, Duration::ZERO, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::other("Intentional failure")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[test_log::test(tokio::test)]
    async fn test_spawn_and_log_runs_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let handle = spawn_and_log("count", async move {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::other("logged, not raised"))
        })
        .unwrap();
        handle.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_and_log_without_runtime() {
        assert!(spawn_and_log("orphan", async { Ok::<_, Error>(()) }).is_none());
    }
}
