// ============================================
// File: crates/tether-common/src/lib.rs
// ============================================
//! # Tether Common - Shared Types Library
//!
//! ## Creation Reason
//! Provides the vocabulary shared by every tether crate: ownership tags,
//! transport identifiers, link states, per-call deadlines and the base
//! error type.
//!
//! ## Main Functionality
//! - [`types`]: `Ownership`, `TransportId`, `LinkState`
//! - [`time`]: `Deadline` for budgets that span several I/O calls
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                tether-probe                         │
//! │                    │                                │
//! │                    ▼                                │
//! │             tether-transport                        │
//! │                    │                                │
//! │                    ▼                                │
//! │             tether-common  ◄── You are here        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal (serde + thiserror only)
//! - `Ownership` values are part of the list API contract; do not reorder
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use time::Deadline;
pub use types::{LinkState, Ownership, TransportId};
