// ============================================
// File: crates/tether-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines the error taxonomy of the transport layer: argument errors,
//! allocation failures, I/O failures and protocol failures, each
//! distinguishable by the caller so it can decide between abort and retry.
//!
//! ## Main Functionality
//! - `TransportError`: Primary error enum for transport operations
//! - `ErrorKind`: Coarse category recorded in the shared error context
//! - Classification helpers (retryable, timeout, allocation, argument)
//!
//! ## Error Categories
//! 1. **Argument**: bad handle, destroyed handle, not connected, bad scheme
//! 2. **Allocation**: a session resource could not be allocated
//! 3. **I/O**: connect/read/write failure or timeout in the lowest layer
//! 4. **Protocol**: handshake rejected, malformed frame
//!
//! ## ⚠️ Important Note for Next Developer
//! - Timeouts are their own variant so callers can tell them from hard failures
//! - Nothing here is fatal; a fresh chain always recovers
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

use tether_common::error::CommonError;
use tether_common::TransportId;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// ErrorKind
// ============================================

/// Coarse error category, as stored in an [`ErrorRecord`](crate::ErrorRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or stale handle / argument.
    Argument,
    /// Session resource allocation failed.
    Allocation,
    /// Underlying I/O primitive failed.
    Io,
    /// Operation ran out of time.
    Timeout,
    /// Peer violated or rejected the protocol.
    Protocol,
    /// Configuration rejected.
    Config,
}

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Argument Errors
    // ========================================

    /// Invalid argument passed to an API.
    #[error("Invalid argument: {what}")]
    InvalidArgument {
        /// What was wrong with the argument
        what: String,
    },

    /// Operation attempted on a transport that has been destroyed.
    #[error("Transport {id} has been destroyed")]
    Destroyed {
        /// Identifier of the destroyed node
        id: TransportId,
    },

    /// I/O attempted while no session is established.
    #[error("Transport is not connected")]
    NotConnected,

    // ========================================
    // Allocation Errors
    // ========================================

    /// A session resource could not be allocated.
    #[error("Cannot allocate {requested} bytes for '{resource}'")]
    Allocation {
        /// Resource entry name
        resource: String,
        /// Bytes requested
        requested: usize,
    },

    // ========================================
    // I/O Errors
    // ========================================

    /// Could not establish the connection.
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Why connecting failed
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout {
        /// What operation timed out
        operation: String,
        /// How long we waited
        duration_ms: u64,
    },

    /// Peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Upgrade handshake was rejected or malformed.
    #[error("Handshake failed{}: {reason}", status_suffix(.status))]
    Handshake {
        /// HTTP status returned by the peer, if any
        status: Option<u16>,
        /// Why the handshake failed
        reason: String,
    },

    /// Malformed or unexpected frame.
    #[error("Protocol error: {reason}")]
    Protocol {
        /// What went wrong
        reason: String,
    },

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidArgument` error.
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument { what: what.into() }
    }

    /// Creates an `Allocation` error.
    pub fn allocation(resource: impl Into<String>, requested: usize) -> Self {
        Self::Allocation {
            resource: resource.into(),
            requested,
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms: tether_common::time::millis(duration),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a `Handshake` error.
    pub fn handshake(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Handshake {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns the coarse category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::Destroyed { .. } | Self::NotConnected => {
                ErrorKind::Argument
            }
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io { source, .. } if source.kind() == io::ErrorKind::TimedOut => {
                ErrorKind::Timeout
            }
            Self::ConnectFailed { .. } | Self::ConnectionClosed | Self::Io { .. } => ErrorKind::Io,
            Self::Handshake { .. } | Self::Protocol { .. } => ErrorKind::Protocol,
            Self::InvalidConfig { .. } => ErrorKind::Config,
            Self::Common(_) => ErrorKind::Argument,
        }
    }

    /// Returns `true` if this error is transient and retryable.
    ///
    /// Retrying is always the caller's decision; no layer retries internally.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::Allocation { .. }
            | Self::ConnectFailed { .. }
            | Self::ConnectionClosed => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }

    /// Returns `true` if this error is a timeout rather than a hard failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns `true` if a session resource could not be allocated.
    #[must_use]
    pub const fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }

    /// Returns `true` if the caller passed a bad or stale argument.
    #[must_use]
    pub const fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::Destroyed { .. } | Self::NotConnected
        )
    }

    /// Returns the underlying I/O error kind, if any.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = TransportError::connect_failed("example.com", 80, "refused");
        assert!(err.to_string().contains("example.com:80"));
        assert!(err.to_string().contains("refused"));

        let err = TransportError::handshake(Some(403), "upgrade rejected");
        assert_eq!(err.to_string(), "Handshake failed (status 403): upgrade rejected");

        let err = TransportError::handshake(None, "truncated response");
        assert_eq!(err.to_string(), "Handshake failed: truncated response");
    }

    #[test]
    fn test_error_classification() {
        let timeout = TransportError::timeout("read", Duration::from_millis(250));
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());

        let alloc = TransportError::allocation("buffer", 2048);
        assert!(alloc.is_allocation_failure());
        assert_eq!(alloc.kind(), ErrorKind::Allocation);

        let stale = TransportError::Destroyed {
            id: TransportId::next(),
        };
        assert!(stale.is_argument_error());
        assert!(!stale.is_retryable());

        let protocol = TransportError::protocol("reserved bits set");
        assert_eq!(protocol.kind(), ErrorKind::Protocol);

        let parse: TransportError = CommonError::parse("owned", "ownership").into();
        assert_eq!(parse.kind(), ErrorKind::Argument);
        assert!(!parse.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "socket wait");
        let transport_err: TransportError = io_err.into();
        assert!(transport_err.is_retryable());
        assert!(transport_err.is_timeout());
        assert_eq!(transport_err.io_kind(), Some(io::ErrorKind::TimedOut));

        let hard = TransportError::io("write", io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(!hard.is_timeout());
        assert_eq!(hard.kind(), ErrorKind::Io);
    }
}
