//! TOML configuration shared by the observer and relay binaries.
//!
//! Every field has a default, so an empty or absent file is a working
//! configuration. CLI flags override whatever is loaded here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ConfigError;

/// Top-level config: one file, one section per binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub observer: ObserverConfig,
    pub relay: RelayConfig,
}

/// Configuration for the observer-side transport bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// WebSocket URL of the local relay.
    pub url: String,
    /// Fixed re-evaluation period in milliseconds.
    pub poll_interval_ms: u64,
    /// Fixed reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,
    /// One-shot settle delay before the first evaluation.
    pub settle_delay_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:54231/".into(),
            poll_interval_ms: 2500,
            reconnect_delay_ms: 2000,
            settle_delay_ms: 600,
        }
    }
}

/// Configuration for the relay listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Loopback host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 54231,
        }
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Platform default config path, e.g. `~/.config/crunchybridge/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crunchybridge").join("config.toml"))
}

/// Load config from a specific TOML file path.
///
/// Missing fields deserialize to their defaults; a missing or unreadable
/// file is an error here — callers decide whether that is fatal.
pub fn load_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.to_path_buf())
        } else {
            ConfigError::ReadError(format!("{}: {e}", path.display()))
        }
    })?;

    let config: BridgeConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config, preferring an explicit path over the platform default.
///
/// An explicit path must exist and parse. The default path is optional: if
/// absent, defaults are used silently.
pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    match explicit {
        Some(path) => load_from_path(path),
        None => match default_config_path() {
            Some(path) => match load_from_path(&path) {
                Ok(config) => Ok(config),
                Err(ConfigError::FileNotFound(_)) => Ok(BridgeConfig::default()),
                Err(e) => Err(e),
            },
            None => Ok(BridgeConfig::default()),
        },
    }
}
