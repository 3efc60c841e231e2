// ============================================
// File: crates/tether-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the small value types that describe a transport chain node
//! independently of any protocol: who owns it, how to name it in logs, and
//! whether its session resources are currently live.
//!
//! ## Main Functionality
//! - `Ownership`: per-list-entry teardown policy (NONE / SHARED / EXCLUSIVE)
//! - `TransportId`: process-unique identifier for log correlation
//! - `LinkState`: UNCONNECTED → CONNECTED → ... → FREED
//!
//! ## Link State Machine
//! ```text
//!                  connect ok
//!   ┌─────────────┐ ────────► ┌───────────┐
//!   │ Unconnected │           │ Connected │
//!   └─────────────┘ ◄──────── └───────────┘
//!          │          close          │
//!          │ destroy                 │ destroy
//!          └──────────► Freed ◄──────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Freed` is terminal; nothing transitions out of it
//! - `Ownership` numeric values mirror the list API (0 / 1 / 2)
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Ownership
// ============================================

/// Teardown policy attached to a transport when it is added to a list.
///
/// # Semantics
/// - `None`: the list never destroys the transport; another owner
///   (typically a child's parent link) is responsible for it.
/// - `Shared`: reference counted; the list destroys it only when it holds
///   the last reference.
/// - `Exclusive`: the list owns it and destroys its whole chain on cleanup.
///
/// # Example
/// ```
/// use tether_common::types::Ownership;
///
/// let ownership: Ownership = "exclusive".parse().unwrap();
/// assert_eq!(ownership, Ownership::Exclusive);
/// assert_eq!(Ownership::default(), Ownership::Exclusive);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Caller or parent chain owns the transport.
    None = 0,
    /// Reference-counted ownership.
    Shared = 1,
    /// List owns the transport exclusively.
    #[default]
    Exclusive = 2,
}

impl Ownership {
    /// Returns the lowercase name used in configs and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ownership {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "shared" => Ok(Self::Shared),
            "exclusive" => Ok(Self::Exclusive),
            _ => Err(CommonError::parse(s, "ownership (none|shared|exclusive)")),
        }
    }
}

// ============================================
// TransportId
// ============================================

/// Process-unique identifier of one transport chain node.
///
/// Identifiers are allocated from a monotonically increasing counter and
/// are never reused, so a log line naming `t#7` always refers to the same
/// node even after it has been freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    /// Allocates the next identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t#{}", self.0)
    }
}

// ============================================
// LinkState
// ============================================

/// Availability of a transport's session resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No session resources are live; I/O is a caller error.
    #[default]
    Unconnected,
    /// Connect succeeded; session resources are live.
    Connected,
    /// Destroyed; the node only exists as a tombstone.
    Freed,
}

impl LinkState {
    /// Returns `true` once the node has been destroyed.
    #[must_use]
    pub const fn is_freed(self) -> bool {
        matches!(self, Self::Freed)
    }

    /// Returns `true` while a session is established.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::Freed => "freed",
        };
        f.write_str(name)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_parse() {
        assert_eq!("NONE".parse::<Ownership>().unwrap(), Ownership::None);
        assert_eq!("shared".parse::<Ownership>().unwrap(), Ownership::Shared);
        assert!("owned".parse::<Ownership>().is_err());
    }

    #[test]
    fn test_ownership_repr() {
        assert_eq!(Ownership::None as u8, 0);
        assert_eq!(Ownership::Shared as u8, 1);
        assert_eq!(Ownership::Exclusive.to_string(), "exclusive");
    }

    #[test]
    fn test_ownership_serde() {
        #[derive(Deserialize)]
        struct Entry {
            ownership: Ownership,
        }

        let entry: Entry = toml::from_str("ownership = \"none\"").unwrap();
        assert_eq!(entry.ownership, Ownership::None);
    }

    #[test]
    fn test_transport_id_unique() {
        let a = TransportId::next();
        let b = TransportId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(a.to_string().starts_with("t#"));
    }

    #[test]
    fn test_link_state() {
        assert_eq!(LinkState::default(), LinkState::Unconnected);
        assert!(LinkState::Connected.is_connected());
        assert!(LinkState::Freed.is_freed());
        assert_eq!(LinkState::Freed.to_string(), "freed");
    }
}
