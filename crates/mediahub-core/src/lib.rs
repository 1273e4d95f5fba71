/*!
 * MediaHub Core
 *
 * This crate provides the ambient functionality shared by MediaHub drivers:
 * configuration, logging, errors, identifiers and the expiring cache used
 * for discovered devices and pairing attempts.
 */

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use chrono;
    pub use futures;
    pub use serde;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// MediaHub core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("MediaHub Core {} initialized", VERSION);
    Ok(())
}

/// Library initialization from a loaded configuration
pub fn init_with_config(config: &config::Config) -> Result<(), error::Error> {
    config.validate()?;
    logging::init_from_config(&config.logging)?;
    tracing::info!(family = %config.family.name, "MediaHub Core {} initialized", VERSION);
    Ok(())
}
