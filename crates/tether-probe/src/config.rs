// ============================================
// File: crates/tether-probe/src/config.rs
// ============================================
//! # Probe Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the probe, loaded from a TOML
//! file with defaults for every field.
//!
//! ## Main Functionality
//! - `ProbeConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//!
//! ## Configuration Sections
//! - `target`: URL of the peer to probe
//! - `tcp`: Root layer options (timeouts, keep-alive)
//! - `ws`: Framed layer options (buffer size, headers)
//! - `probe`: Cycle count, timeouts, payload, list ownership of the leaf
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [target]
//! url = "ws://127.0.0.1:9001/echo"
//!
//! [tcp]
//! connect_timeout_ms = 5000
//! nodelay = true
//!
//! [ws]
//! buffer_size = 4096
//! sub_protocol = "echo"
//!
//! [ws.headers]
//! X-Probe = "tether"
//!
//! [probe]
//! cycles = 100
//! io_timeout_ms = 2000
//! message = "ping"
//! leaf_ownership = "none"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The `ws.path` is overridden by the path of `target.url`
//! - Transport sections validate themselves; errors keep their field name
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use tether_common::Ownership;
use tether_transport::{TcpConfig, WsConfig};

use crate::error::{ProbeError, Result};
use crate::target::Target;

// ============================================
// ProbeConfig
// ============================================

/// Main probe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Peer to probe.
    #[serde(default)]
    pub target: TargetConfig,

    /// Root TCP layer options.
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Framed layer options.
    #[serde(default)]
    pub ws: WsConfig,

    /// Probe run options.
    #[serde(default)]
    pub probe: ProbeSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProbeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProbeError::config_load(&path_str, e.to_string()))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ProbeError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ProbeError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.target.parse()?;
        self.tcp.validate()?;
        self.ws.validate()?;
        self.probe.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns the parsed target.
    ///
    /// # Errors
    /// Returns `InvalidTarget` if `target.url` does not parse.
    pub fn target(&self) -> Result<Target> {
        self.target.parse()
    }

    /// Returns the framed layer options with the target's path applied.
    ///
    /// # Errors
    /// Returns `InvalidTarget` if `target.url` does not parse.
    pub fn ws_for_target(&self) -> Result<WsConfig> {
        let target = self.target()?;
        Ok(WsConfig {
            path: target.path,
            ..self.ws.clone()
        })
    }
}

// ============================================
// TargetConfig
// ============================================

/// Target configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// `ws://host[:port][/path]` or `tcp://host:port`.
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "ws://127.0.0.1:9001/".to_string()
}

impl TargetConfig {
    fn parse(&self) -> Result<Target> {
        Target::parse(&self.url)
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

// ============================================
// ProbeSettings
// ============================================

/// Probe run configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Number of connect → write → read → close cycles.
    #[serde(default = "default_cycles")]
    pub cycles: u32,

    /// Per-call timeout for connect, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-call timeout for read and write, in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Pause between cycles, in milliseconds.
    #[serde(default)]
    pub pause_ms: u64,

    /// Payload written once per connected cycle.
    #[serde(default = "default_message")]
    pub message: String,

    /// Whether a connected cycle waits for a reply.
    #[serde(default = "default_expect_reply")]
    pub expect_reply: bool,

    /// List ownership of the TCP leaf under a framed layer.
    #[serde(default = "default_leaf_ownership")]
    pub leaf_ownership: Ownership,
}

fn default_cycles() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_io_timeout_ms() -> u64 {
    2000
}

fn default_message() -> String {
    "tether-probe".to_string()
}

fn default_expect_reply() -> bool {
    true
}

fn default_leaf_ownership() -> Ownership {
    Ownership::None
}

impl ProbeSettings {
    /// Upper bound for the per-call timeouts.
    pub const MAX_TIMEOUT_MS: u64 = 300_000;

    fn validate(&self) -> Result<()> {
        if self.cycles == 0 {
            return Err(ProbeError::config_invalid("probe.cycles", "must be greater than 0"));
        }

        for (field, value) in [
            ("probe.connect_timeout_ms", self.connect_timeout_ms),
            ("probe.io_timeout_ms", self.io_timeout_ms),
        ] {
            if value == 0 || value > Self::MAX_TIMEOUT_MS {
                return Err(ProbeError::config_invalid(
                    field,
                    format!("must be between 1 and {}", Self::MAX_TIMEOUT_MS),
                ));
            }
        }

        if self.message.is_empty() {
            return Err(ProbeError::config_invalid("probe.message", "cannot be empty"));
        }

        Ok(())
    }

    /// Returns the connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the read/write timeout.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Returns the pause between cycles.
    #[must_use]
    pub const fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            pause_ms: 0,
            message: default_message(),
            expect_reply: default_expect_reply(),
            leaf_ownership: default_leaf_ownership(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================
