//! Configuration for SpectatorLink
//!
//! Loads configuration from a TOML file. Every field has a default, so a
//! partial file (or none at all) is valid.

use crate::error::{Error, Result};
use crate::mesh::RemainderPolicy;
use crate::protocol::{FRAGMENT_HEADER_LEN, POSE_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub compositor: CompositorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device host connection settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Device host IP address (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port number (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for a single connection attempt in milliseconds (default: 2000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Delay between connection attempts in milliseconds (default: 100)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Socket read timeout in milliseconds, bounds shutdown latency (default: 500)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

/// Wire protocol parameters (must match the sender)
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Inline payload bytes carried by every spatial-mapping frame (default: 4096)
    #[serde(default = "default_fragment_payload_capacity")]
    pub fragment_payload_capacity: usize,

    /// Largest mesh-set length accepted before allocation (default: 64 MiB)
    #[serde(default = "default_max_mesh_set_bytes")]
    pub max_mesh_set_bytes: usize,
}

/// Pose cache settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoseConfig {
    /// Number of recent poses retained (default: 30)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Seconds per unit of the sender's timestamp (default: 0.0001)
    #[serde(default = "default_sent_time_scale")]
    pub sent_time_scale: f64,
}

/// Mesh decoding settings
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MeshConfig {
    /// What to do with a vertex/index section that is not a whole number of elements
    #[serde(default)]
    pub remainder_policy: RemainderPolicy,
}

/// Consumer-side settings for the client daemon
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CompositorConfig {
    /// Render ticks per second (default: 60)
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Pose offset (in frames) queried each tick (default: 0)
    #[serde(default)]
    pub frame_offset: usize,
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_connect_timeout() -> u64 {
    2000
}
fn default_retry_backoff() -> u64 {
    100
}
fn default_read_timeout() -> u64 {
    500
}
fn default_fragment_payload_capacity() -> usize {
    4096
}
fn default_max_mesh_set_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_cache_capacity() -> usize {
    30
}
fn default_sent_time_scale() -> f64 {
    0.0001
}
fn default_tick_hz() -> u32 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fragment_payload_capacity: default_fragment_payload_capacity(),
            max_mesh_set_bytes: default_max_mesh_set_bytes(),
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            sent_time_scale: default_sent_time_scale(),
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            frame_offset: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the receive pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if FRAGMENT_HEADER_LEN + self.protocol.fragment_payload_capacity <= POSE_FRAME_LEN {
            return Err(Error::Config(format!(
                "fragment_payload_capacity must exceed {} bytes so fragment frames are longer than pose frames",
                POSE_FRAME_LEN - FRAGMENT_HEADER_LEN
            )));
        }
        if self.protocol.max_mesh_set_bytes == 0 {
            return Err(Error::Config("max_mesh_set_bytes must be positive".into()));
        }
        if self.pose.cache_capacity == 0 {
            return Err(Error::Config("pose cache_capacity must be positive".into()));
        }
        if !(self.pose.sent_time_scale.is_finite() && self.pose.sent_time_scale > 0.0) {
            return Err(Error::Config(
                "sent_time_scale must be a positive number".into(),
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be positive".into()));
        }
        if self.connection.read_timeout_ms == 0 {
            return Err(Error::Config("read_timeout_ms must be positive".into()));
        }
        if self.connection.retry_backoff_ms == 0 {
            return Err(Error::Config("retry_backoff_ms must be positive".into()));
        }
        if self.compositor.tick_hz == 0 {
            return Err(Error::Config("tick_hz must be positive".into()));
        }
        Ok(())
    }

    /// Get the full address string for connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.connection.host, self.connection.port)
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
