/*!
 * Logging functionality for MediaHub.
 *
 * This module provides tracing setup and the spans used to correlate device
 * and pairing work in the hub's logs.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "mediahub_devices=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    install(filter, false)
}

/// Initialize the logging system from the `[logging]` configuration section
///
/// `RUST_LOG` still takes precedence over the configured level.
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    install(&config.level, config.json_format)
}

fn install(filter: &str, json_format: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let (plain, json) = if json_format {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a span for an operation against one device
///
/// # Arguments
///
/// * `operation` - The name of the operation (e.g. "resolve", "run_exclusive")
/// * `device_id` - The identifier of the target device
pub fn device_span(operation: &str, device_id: &str) -> Span {
    tracing::info_span!("device", operation = %operation, device_id = %device_id)
}

/// Create a span for one step of a pairing attempt
///
/// # Arguments
///
/// * `operation` - The pairing step (e.g. "start", "finalize")
/// * `request_id` - The pairing request, if one has been issued yet
pub fn pairing_span(operation: &str, request_id: Option<&str>) -> Span {
    match request_id {
        Some(request_id) => {
            tracing::info_span!("pairing", operation = %operation, request_id = %request_id)
        }
        None => tracing::info_span!("pairing", operation = %operation),
    }
}
