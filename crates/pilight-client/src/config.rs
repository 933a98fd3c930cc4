//! Client configuration.
//!
//! Read from the `[client]` section of `~/.pilight/config.toml`, or built in
//! code. Every field has a default matching a daemon on the local host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pilight_protocol::IdentifyOptions;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::filter::FilterPolicy;
use crate::transport::Endpoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Daemon host name or address.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// Daemon API port.
    /// Default: 5000
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect, read and write timeout in milliseconds. Also the interval at
    /// which the receiver notices a stop request.
    /// Default: 1000
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Identification options for the event channel.
    /// None = `{core:0, receiver:1, config:0, forward:0}`
    #[serde(default)]
    pub recv_ident: Option<IdentifyOptions>,

    /// Only deliver frames that originate from a receiver.
    /// Default: true
    #[serde(default = "default_true")]
    pub recv_codes_only: bool,

    /// Only deliver the first reception of a code.
    /// Default: true
    #[serde(default = "default_true")]
    pub veto_repeats: bool,

    /// Watchdog probe period in milliseconds.
    /// Default: 100
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Pause before any reconnect attempt, in milliseconds.
    /// Default: 100
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            recv_ident: None,
            recv_codes_only: true,
            veto_repeats: true,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u64 {
    100
}

fn default_reconnect_delay_ms() -> u64 {
    100
}

impl ClientConfig {
    /// Config for a daemon at `host:port`, everything else default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration {
                message: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidConfiguration {
                message: "port must be > 0".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfiguration {
                message: "timeout_ms must be > 0".to_string(),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidConfiguration {
                message: "heartbeat_interval_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Read the `[client]` section of a TOML file. Unlike
    /// [`load_client_config`], every failure is an error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| ConfigError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        file.client.validate()?;
        Ok(file.client)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port, self.timeout())
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            restrict_to_events: self.recv_codes_only,
            suppress_repeats: self.veto_repeats,
        }
    }

    /// Options sent when identifying the event channel.
    pub fn receiver_identification(&self) -> IdentifyOptions {
        self.recv_ident
            .clone()
            .unwrap_or_else(IdentifyOptions::receiver)
    }
}

/// Mirrors just enough of the config file to extract the `[client]` section.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client: ClientConfig,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pilight").join("config.toml"))
}

/// Load client configuration from `~/.pilight/config.toml`.
///
/// A missing file yields defaults. An unreadable or unparsable file is
/// logged and also yields defaults; only invalid values are an error.
pub fn load_client_config() -> Result<ClientConfig, ConfigError> {
    let Some(config_path) = default_config_path() else {
        tracing::warn!(
            event = "client.config.home_dir_missing",
            fallback = "defaults",
        );
        return Ok(ClientConfig::default());
    };
    load_client_config_from(&config_path)
}

fn load_client_config_from(config_path: &Path) -> Result<ClientConfig, ConfigError> {
    let config = match std::fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
            Ok(file) => file.client,
            Err(e) => {
                tracing::warn!(
                    event = "client.config.parse_failed",
                    path = %config_path.display(),
                    error = %e,
                );
                ClientConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ClientConfig::default(),
        Err(e) => {
            tracing::warn!(
                event = "client.config.read_failed",
                path = %config_path.display(),
                error = %e,
            );
            ClientConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}
