// ============================================
// File: crates/tether-transport/src/error_context.rs
// ============================================
//! # Shared Error Context
//!
//! ## Creation Reason
//! An application talking to the outermost layer still wants to know what
//! actually broke further down (a refused socket, a 403 upgrade reply).
//! One `ErrorContext` is shared by every node of a chain; whichever node
//! observes a failure writes it, and the application reads it afterwards.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Last writer wins; there is no history
//! - Passed explicitly at construction, wrapping layers inherit the parent's
//!
//! ## Last Modified
//! v0.1.0 - Initial error context

use std::io;

use parking_lot::Mutex;

use tether_common::TransportId;

use crate::error::{ErrorKind, TransportError};

/// Snapshot of the most recent failure observed on a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Layer kind that reported the failure (e.g. `"ws"`).
    pub layer: &'static str,
    /// Node that reported the failure.
    pub transport: TransportId,
    /// Coarse category.
    pub kind: ErrorKind,
    /// Rendered error message.
    pub message: String,
    /// Lower-level I/O error kind, if the failure came from a socket.
    pub io_kind: Option<io::ErrorKind>,
    /// Protocol status code, if the peer answered with one.
    pub status: Option<u16>,
}

impl ErrorRecord {
    /// Builds a record from a transport error.
    #[must_use]
    pub fn from_error(layer: &'static str, transport: TransportId, err: &TransportError) -> Self {
        let status = match err {
            TransportError::Handshake { status, .. } => *status,
            _ => None,
        };
        Self {
            layer,
            transport,
            kind: err.kind(),
            message: err.to_string(),
            io_kind: err.io_kind(),
            status,
        }
    }

    /// Returns `true` if the recorded failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

/// Last-writer-wins error slot shared along a transport chain.
#[derive(Debug, Default)]
pub struct ErrorContext {
    last: Mutex<Option<ErrorRecord>>,
}

impl ErrorContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the stored record with `err`.
    pub fn record(&self, layer: &'static str, transport: TransportId, err: &TransportError) {
        *self.last.lock() = Some(ErrorRecord::from_error(layer, transport, err));
    }

    /// Returns a copy of the most recent record.
    #[must_use]
    pub fn last(&self) -> Option<ErrorRecord> {
        self.last.lock().clone()
    }

    /// Removes and returns the most recent record.
    pub fn take(&self) -> Option<ErrorRecord> {
        self.last.lock().take()
    }

    /// Forgets the stored record.
    pub fn clear(&self) {
        *self.last.lock() = None;
    }
}
