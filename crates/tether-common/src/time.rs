// ============================================
// File: crates/tether-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Transport timeouts are advisory and per call. A layer that needs several
//! parent calls to finish one logical step (a handshake, writing a whole
//! frame) has to split the caller's budget across them; `Deadline` does that.
//!
//! ## Main Functionality
//! - `Deadline`: fixed point in time derived from a per-call timeout
//! - `millis`: saturating `Duration` → milliseconds for error reporting
//!
//! ## ⚠️ Important Note for Next Developer
//! - A deadline is not a standing cancellation object; nothing is cancelled
//!   when it expires, callers just stop issuing further calls
//! - A timeout too large to represent as an `Instant` (e.g. `Duration::MAX`)
//!   yields an unbounded deadline that never expires
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::time::{Duration, Instant};

// ============================================
// Deadline
// ============================================

/// A per-call time budget that can be shared by several sequential calls.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tether_common::time::Deadline;
///
/// let deadline = Deadline::after(Duration::from_millis(500));
/// assert!(!deadline.is_expired());
/// assert!(deadline.remaining() <= Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
    /// `None` when `started + budget` overflows.
    at: Option<Instant>,
}

impl Deadline {
    /// Creates a deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            budget: timeout,
            at: started.checked_add(timeout),
        }
    }

    /// Returns `true` if the deadline can never expire.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.at.is_none()
    }

    /// Returns the time left, or zero once expired.
    ///
    /// An unbounded deadline reports the budget minus the time spent.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => self.budget.saturating_sub(self.elapsed()),
        }
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Returns the full budget this deadline was created with.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Returns the time spent since the deadline was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================
// Tests
// ============================================
