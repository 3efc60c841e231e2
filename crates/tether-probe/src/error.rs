// ============================================
// File: crates/tether-probe/src/error.rs
// ============================================
//! # Probe Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial probe errors

use thiserror::Error;

use tether_common::error::CommonError;
use tether_transport::error::TransportError;

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the file
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Target URL could not be parsed.
    #[error("Invalid target '{url}': {reason}")]
    InvalidTarget {
        /// The URL as given
        url: String,
        /// What is wrong with it
        reason: String,
    },

    /// Transport layer error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Shared error.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// I/O error outside the transport chain.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidTarget` error.
    pub fn invalid_target(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by the configuration.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::InvalidTarget { .. }
                | Self::Transport(TransportError::InvalidConfig { .. })
        )
    }

    /// Returns `true` if trying again later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProbeError::config_load("/etc/tether/probe.toml", "file not found");
        assert!(err.to_string().contains("/etc/tether/probe.toml"));

        let err = ProbeError::invalid_target("ftp://x", "unsupported scheme");
        assert!(err.to_string().contains("ftp://x"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ProbeError::config_invalid("probe.cycles", "must be greater than 0").is_config_error());
        assert!(ProbeError::from(TransportError::invalid_config("ws.path", "bad")).is_config_error());

        let timeout = ProbeError::from(TransportError::timeout("tcp read", std::time::Duration::from_secs(1)));
        assert!(timeout.is_retryable());
        assert!(!timeout.is_config_error());
    }
}
