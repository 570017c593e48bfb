//! Station Configuration Module
//!
//! Loads the workstation settings from built-in defaults, an optional TOML
//! file and `STATION_`-prefixed environment variables, in that order.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Accepted values of `rtde.acceptance`
pub const ACCEPTANCE_STRATEGIES: [&str; 2] = ["version_echo", "flag"];

/// Complete workstation configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct StationConfig {
    pub rtde: RtdeSettings,
    pub vision: VisionSettings,
    pub stream: StreamSettings,
    pub listener: ListenerSettings,
    pub downstream: DownstreamSettings,
    pub catalog: CatalogSettings,
}

/// Robot controller endpoints
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RtdeSettings {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub fallback_port: u16,
    pub acceptance: String,
}

impl Default for RtdeSettings {
    fn default() -> Self {
        Self {
            host: defaults::rtde::HOST.to_string(),
            port: defaults::rtde::PORT,
            timeout_ms: defaults::rtde::TIMEOUT_MS,
            fallback_port: defaults::rtde::FALLBACK_PORT,
            acceptance: defaults::rtde::ACCEPTANCE.to_string(),
        }
    }
}

impl RtdeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct VisionSettings {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            host: defaults::vision::HOST.to_string(),
            port: defaults::vision::PORT,
            timeout_ms: defaults::vision::TIMEOUT_MS,
        }
    }
}

impl VisionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Upstream text stream
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub enabled: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            host: defaults::stream::HOST.to_string(),
            port: defaults::stream::PORT,
            connect_timeout_ms: defaults::stream::CONNECT_TIMEOUT_MS,
            base_backoff_ms: defaults::stream::BASE_BACKOFF_MS,
            max_backoff_ms: defaults::stream::MAX_BACKOFF_MS,
            enabled: defaults::stream::ENABLED,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListenerSettings {
    pub bind_address: String,
    pub port: u16,
    pub max_connections: usize,
    pub read_buffer_size: usize,
    pub notify_host: String,
    pub notify_port: u16,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            bind_address: defaults::listener::BIND_ADDRESS.to_string(),
            port: defaults::listener::PORT,
            max_connections: defaults::listener::MAX_CONNECTIONS,
            read_buffer_size: defaults::listener::READ_BUFFER_SIZE,
            notify_host: defaults::listener::NOTIFY_HOST.to_string(),
            notify_port: defaults::listener::NOTIFY_PORT,
        }
    }
}

/// Cobot receiving the formatted replies
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DownstreamSettings {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub read_ack: bool,
    pub append_end_marker: bool,
}

impl Default for DownstreamSettings {
    fn default() -> Self {
        Self {
            host: defaults::downstream::HOST.to_string(),
            port: defaults::downstream::PORT,
            timeout_ms: defaults::downstream::TIMEOUT_MS,
            read_ack: defaults::downstream::READ_ACK,
            append_end_marker: defaults::downstream::APPEND_END_MARKER,
        }
    }
}

impl DownstreamSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CatalogSettings {
    /// JSON file of product records; may contain `$VAR` / `~`
    pub path: Option<String>,
}

impl StationConfig {
    /// Load configuration, layering an optional file and the environment over
    /// the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(defaults::ENV_PREFIX)
            .prefix_separator("_")
            .separator(defaults::ENV_SEPARATOR)
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading station config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        } else {
            debug!("No config file given, using defaults");
        }

        // Override with environment variables (STATION_ prefix)
        builder = builder.add_source(environment);

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject values no device link can work with
    pub fn validate(&self) -> Result<()> {
        let ports = [
            ("rtde.port", self.rtde.port),
            ("rtde.fallback_port", self.rtde.fallback_port),
            ("vision.port", self.vision.port),
            ("stream.port", self.stream.port),
            ("listener.port", self.listener.port),
            ("listener.notify_port", self.listener.notify_port),
            ("downstream.port", self.downstream.port),
        ];
        for (field, port) in ports {
            if port == 0 {
                bail!("Invalid configuration for {field}: port must be non-zero");
            }
        }

        if self.stream.max_backoff_ms < self.stream.base_backoff_ms {
            bail!(
                "Invalid configuration for stream.max_backoff_ms: {} is below base_backoff_ms {}",
                self.stream.max_backoff_ms,
                self.stream.base_backoff_ms
            );
        }

        if !ACCEPTANCE_STRATEGIES.contains(&self.rtde.acceptance.as_str()) {
            bail!(
                "Invalid configuration for rtde.acceptance: '{}' (expected one of {:?})",
                self.rtde.acceptance,
                ACCEPTANCE_STRATEGIES
            );
        }

        if self.listener.max_connections == 0 {
            bail!("Invalid configuration for listener.max_connections: must be at least 1");
        }

        Ok(())
    }

    /// Expand environment variables and `~` in path values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(path) = &self.catalog.path {
            let expanded = shellexpand::full(path).context("Failed to expand catalog path")?;
            self.catalog.path = Some(expanded.to_string());
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.path.as_ref().map(PathBuf::from)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Load, expand and validate the configuration
pub fn load_config(path: Option<&Path>) -> Result<StationConfig> {
    let mut config = StationConfig::load(path)?;
    config.expand_env_vars()?;
    config.validate()?;
    Ok(config)
}
