// ============================================
// File: crates/tether-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Errors raised by the shared types in this crate. Today that is only
//! parsing config values such as `Ownership`.
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for shared operations
//! - `Result<T>`: Type alias using `CommonError`
//!
//! ## Design Philosophy
//! - Use `thiserror` for ergonomic error definitions
//! - Each crate defines its own error type that wraps `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Keep error variants specific but not too granular
//! - Implement `From` traits for seamless error propagation
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across tether crates.
///
/// # Example
/// ```
/// use tether_common::error::{CommonError, Result};
/// use tether_common::Ownership;
///
/// fn parse_ownership(value: &str) -> Result<Ownership> {
///     value.parse()
/// }
///
/// assert!(matches!(parse_ownership("owned"), Err(CommonError::Parse { .. })));
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Value could not be parsed into the expected type.
    #[error("Cannot parse '{value}' as {expected}")]
    Parse {
        /// The offending input
        value: String,
        /// What we expected to find
        expected: &'static str,
    },
}

impl CommonError {
    /// Creates a `Parse` error.
    pub fn parse(value: impl Into<String>, expected: &'static str) -> Self {
        Self::Parse {
            value: value.into(),
            expected,
        }
    }
}

// ============================================
// Tests
// ============================================
