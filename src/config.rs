//! Load config from file and environment.
//!
//! ```toml
//! id = 1
//! output_dir = "/home/me/Slippi"
//! console_nick = "Station 1"
//!
//! [upstream]
//! address = "192.168.1.40"
//! port = 51441
//!
//! [relay]
//! base_port = 666
//! idle_timeout_secs = 20
//!
//! [status]
//! source_name = "slp-live"
//! min_frame = -60
//! ```
//!
//! Env overrides: `SLP_RELAY_OUTPUT_DIR`, `SLP_RELAY_ID`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RelayError, Result};
use crate::relay::relay_port;

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Instance id; selects the relay port (default 1).
    #[serde(default = "default_id")]
    pub id: u16,
    /// Directory replay files are written to (default `./replays`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Console nickname stored in every trailer.
    #[serde(default)]
    pub console_nick: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub status: StatusSettings,
}

/// Where the console stream comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    pub address: String,
    pub port: u16,
}

/// Relay listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySettings {
    pub enabled: bool,
    pub bind_address: IpAddr,
    /// Listen port is `base_port + id`.
    pub base_port: u16,
    pub idle_timeout_secs: u64,
}

/// Live indicator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusSettings {
    /// Source toggled in every scene that contains it.
    pub source_name: String,
    /// Pulses are ignored until `lastFrame` reaches this index.
    pub min_frame: i32,
    pub default_hold_ms: u64,
    pub extended_hold_ms: u64,
}

fn default_id() -> u16 {
    1
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("replays")
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 51441,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            base_port: 666,
            idle_timeout_secs: 20,
        }
    }
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            source_name: "slp-live".to_string(),
            min_frame: -60,
            default_hold_ms: 500,
            extended_hold_ms: 5000,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            output_dir: default_output_dir(),
            console_nick: String::new(),
            upstream: UpstreamConfig::default(),
            relay: RelaySettings::default(),
            status: StatusSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config: file (if given), then env vars, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SLP_RELAY_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os("SLP_RELAY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(s) = std::env::var("SLP_RELAY_ID") {
            match s.parse::<u16>() {
                Ok(id) => self.id = id,
                Err(_) => tracing::warn!("Ignoring SLP_RELAY_ID={:?}", s),
            }
        }
    }

    /// Check values the trailer and listener cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.console_nick.len() > u8::MAX as usize {
            return Err(RelayError::InvalidConfig(format!(
                "console_nick is {} bytes, limit is 255",
                self.console_nick.len()
            )));
        }
        if self.relay.idle_timeout_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "relay.idle_timeout_secs must be positive".to_string(),
            ));
        }
        relay_port(self.relay.base_port, self.id)?;
        Ok(())
    }

    /// Address the relay listener binds to.
    pub fn relay_addr(&self) -> Result<SocketAddr> {
        let port = relay_port(self.relay.base_port, self.id)?;
        Ok(SocketAddr::new(self.relay.bind_address, port))
    }

    /// `host:port` of the console.
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.upstream.address, self.upstream.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.idle_timeout_secs)
    }

    pub fn default_hold(&self) -> Duration {
        Duration::from_millis(self.status.default_hold_ms)
    }

    pub fn extended_hold(&self) -> Duration {
        Duration::from_millis(self.status.extended_hold_ms)
    }
}
