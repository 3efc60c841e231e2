// ============================================
// File: crates/tether-probe/src/lib.rs
// ============================================
//! # Tether Probe Library
//!
//! ## Creation Reason
//! Drives a tether transport chain through repeated connect / exchange /
//! close cycles and reports how each cycle ended. Used as a smoke test for
//! chain lifecycles against a real peer.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Probe configuration management
//! - [`target`]: Target URL parsing
//! - [`stack`]: Chain assembly and list registration
//! - [`probe`]: Cycle runner and report
//! - [`error`]: Probe-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    tether-probe                      │
//! │                                                      │
//! │  ┌──────────┐    ┌──────────┐    ┌───────────────┐  │
//! │  │  Config  │───►│  Stack   │───►│    Prober     │  │
//! │  └──────────┘    └────┬─────┘    └───────────────┘  │
//! │                       │                              │
//! ├───────────────────────┼──────────────────────────────┤
//! │                       ▼        tether-transport      │
//! │   TransportList ──► ws ──parent──► tcp               │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The probe never retries inside a cycle; each cycle starts fresh
//! - Always finish with `ProbeStack::destroy`
//!
//! ## Last Modified
//! v0.1.0 - Initial probe library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod probe;
pub mod stack;
pub mod target;

// Re-export primary types
pub use config::ProbeConfig;
pub use error::{ProbeError, Result};
pub use probe::{CycleOutcome, ProbeReport, Prober};
pub use stack::ProbeStack;
pub use target::{Target, TargetScheme};
