/*!
 * Configuration management for MediaHub.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for a MediaHub device driver.
 */
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::MAX_TTL;
use crate::error::{Error, Result};

/// Core configuration for a MediaHub driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Device family configuration
    #[serde(default)]
    pub family: FamilyConfig,

    /// Discovery cache configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Pairing configuration
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Command execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Hub-provided configuration directory
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Device family configuration
///
/// A family is the set of devices one driver descriptor is responsible for.
/// All devices of a family share one credential file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Short family name, also the credential file stem
    #[serde(default = "default_family_name")]
    pub name: String,

    /// Name shown by the hub
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Description shown by the hub
    #[serde(default = "default_description")]
    pub description: String,

    /// Only devices whose model starts with this prefix are listed
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,

    /// Stable driver identifier
    #[serde(default = "default_driver_id")]
    pub driver_id: Uuid,
}

/// Discovery cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Lifetime of a cached device handle, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached device handles
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Pairing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Lifetime of an unfinished pairing attempt, in seconds
    #[serde(default = "default_attempt_ttl_secs")]
    pub attempt_ttl_secs: u64,

    /// Maximum number of pairing attempts in flight
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Protocol service the pairing handshake runs against
    #[serde(default = "default_pairing_service")]
    pub service: String,
}

/// Command execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Additional attempts after a failed command (0 means exactly one attempt)
    #[serde(default)]
    pub retries: usize,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            name: default_family_name(),
            display_name: default_display_name(),
            description: default_description(),
            model_prefix: default_model_prefix(),
            driver_id: default_driver_id(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            attempt_ttl_secs: default_attempt_ttl_secs(),
            max_attempts: default_max_attempts(),
            service: default_pairing_service(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_config_dir() -> String {
    "./config".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_family_name() -> String {
    "appletv".to_string()
}

fn default_display_name() -> String {
    "AppleTV".to_string()
}

fn default_description() -> String {
    "MediaHub driver for controlling AppleTVs".to_string()
}

fn default_model_prefix() -> String {
    "AppleTV".to_string()
}

fn default_driver_id() -> Uuid {
    Uuid::from_u128(0x9a5785fd_69c9_426b_85e0_c860498757bb)
}

fn default_cache_ttl_secs() -> u64 {
    20 * 60
}

fn default_cache_capacity() -> usize {
    20
}

fn default_attempt_ttl_secs() -> u64 {
    5 * 60
}

fn default_max_attempts() -> usize {
    10
}

fn default_pairing_service() -> String {
    "companion".to_string()
}

fn default_retry_delay_ms() -> u64 {
    250
}

impl Config {
    /// Path of the family's credential file inside the configuration directory
    pub fn credential_store_path(&self) -> PathBuf {
        Path::new(&self.general.config_dir).join(format!("{}.conf", self.family.name))
    }

    /// Check the configuration for values the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.family.name.trim().is_empty() {
            return Err(Error::config("family.name must not be empty"));
        }
        if self.discovery.cache_capacity == 0 {
            return Err(Error::config("discovery.cache_capacity must be at least 1"));
        }
        if self.discovery.cache_ttl_secs == 0 {
            return Err(Error::config("discovery.cache_ttl_secs must be at least 1"));
        }
        if self.discovery.cache_ttl_secs > MAX_TTL.as_secs() {
            return Err(Error::config(format!(
                "discovery.cache_ttl_secs must not exceed {}",
                MAX_TTL.as_secs()
            )));
        }
        if self.pairing.max_attempts == 0 {
            return Err(Error::config("pairing.max_attempts must be at least 1"));
        }
        if self.pairing.attempt_ttl_secs == 0 {
            return Err(Error::config("pairing.attempt_ttl_secs must be at least 1"));
        }
        if self.pairing.attempt_ttl_secs > MAX_TTL.as_secs() {
            return Err(Error::config(format!(
                "pairing.attempt_ttl_secs must not exceed {}",
                MAX_TTL.as_secs()
            )));
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl DiscoveryConfig {
    /// Lifetime of a cached device handle
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl PairingConfig {
    /// Lifetime of an unfinished pairing attempt
    pub fn attempt_ttl(&self) -> Duration {
        Duration::from_secs(self.attempt_ttl_secs)
    }
}

impl ExecutionConfig {
    /// Delay between command attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    config_dir: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Use the configuration directory handed over by the hub
    ///
    /// Takes precedence over file and environment values.
    pub fn with_config_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config_dir = Some(dir.as_ref().to_string_lossy().to_string());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let mut config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        if let Some(config_dir) = self.config_dir {
            config.general.config_dir = config_dir;
        }

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.family.name, "appletv");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.discovery.cache_ttl(), Duration::from_secs(1200));
        assert_eq!(config.discovery.cache_capacity, 20);
        assert_eq!(config.pairing.attempt_ttl(), Duration::from_secs(300));
        assert_eq!(config.pairing.max_attempts, 10);
        assert_eq!(config.execution.retries, 0);
        assert_eq!(
            config.family.driver_id.to_string(),
            "9a5785fd-69c9-426b-85e0-c860498757bb"
        );
    }

    #[test]
    fn test_credential_store_path() {
        let mut config = Config::default();
        config.general.config_dir = "/var/lib/hub".to_string();
        assert_eq!(
            config.credential_store_path(),
            PathBuf::from("/var/lib/hub/appletv.conf")
        );
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.family.display_name, "AppleTV");
        assert_eq!(config.pairing.service, "companion");
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("driver.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [logging]
                level = "debug"

                [discovery]
                cache_ttl_secs = 60
                cache_capacity = 4

                [execution]
                retries = 2
            "#,
            )?;
        }

        let config = ConfigBuilder::new().with_config_file(&file_path).build()?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.discovery.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.discovery.cache_capacity, 4);
        assert_eq!(config.execution.retries, 2);
        assert_eq!(config.pairing.max_attempts, 10);

        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("MEDIAHUBTEST__PAIRING__SERVICE", "airplay");
        env::set_var("MEDIAHUBTEST__PAIRING__MAX_ATTEMPTS", "3");

        let config = ConfigBuilder::new()
            .with_environment_prefix("mediahubtest")
            .build()?;

        assert_eq!(config.pairing.service, "airplay");
        assert_eq!(config.pairing.max_attempts, 3);

        env::remove_var("MEDIAHUBTEST__PAIRING__SERVICE");
        env::remove_var("MEDIAHUBTEST__PAIRING__MAX_ATTEMPTS");

        Ok(())
    }

    #[test]
    fn test_config_dir_override_wins() -> Result<()> {
        let dir = tempdir()?;
        let config = ConfigBuilder::new().with_config_dir(dir.path()).build()?;
        assert_eq!(
            config.credential_store_path(),
            dir.path().join("appletv.conf")
        );
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.discovery.cache_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.pairing.attempt_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_bounds_ttls() {
        let mut config = Config::default();
        config.discovery.cache_ttl_secs = MAX_TTL.as_secs();
        config.pairing.attempt_ttl_secs = MAX_TTL.as_secs();
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.discovery.cache_ttl_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.pairing.attempt_ttl_secs = MAX_TTL.as_secs() + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_to_toml_contains_sections() -> Result<()> {
        let rendered = Config::default().to_toml()?;
        assert!(rendered.contains("[discovery]"));
        assert!(rendered.contains("cache_capacity = 20"));
        Ok(())
    }

    #[test]
    fn test_shared_config() {
        let shared = SharedConfig::new(Config::default());
        let shared2 = shared.clone();
        assert_eq!(shared2.get().family.name, "appletv");
    }
}
