// ============================================
// File: crates/tether-transport/src/lib.rs
// ============================================
//! # Tether Transport - Layered Connection Chains
//!
//! ## Creation Reason
//! Provides a stackable transport abstraction: each layer wraps a parent
//! layer, owns its session resources through a registry, and is torn down
//! in a fixed order by chain operations and the transport list.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`resource`]: Declarative session resource registry (init/cleanup)
//! - [`traits`]: The `Transport` layer contract
//! - [`handle`]: Shared transport nodes (`TransportHandle`)
//! - [`chain`]: Child-to-root chain operations and teardown
//! - [`list`]: Scheme-keyed ownership list
//! - [`error_context`]: Shared last-error store
//! - [`tcp`]: Root TCP layer
//! - [`ws`]: WebSocket-style framed layer
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 tether-probe                        │
//! │                      │                              │
//! │                      ▼                              │
//! │              tether-transport                       │
//! │              You are here ◄──                       │
//! │                      │                              │
//! │                      ▼                              │
//! │               tether-common                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Chain Layout
//! ```text
//!   TransportList                    chain (child ─► root)
//!   ┌──────────────┬───────────┐
//!   │ "ws"         │ Exclusive │ ───► [ws] ──parent──► [tcp]
//!   │ "_tcp"       │ None      │ ─────────────────────────┘
//!   └──────────────┴───────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Layers never close or destroy their parent in `destroy`
//! - `close` is the only op that walks down into the parent from a layer
//! - A node is freed at most once; later ops return `Destroyed`
//! - Mock layer available with the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial layered transport implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chain;
pub mod error;
pub mod error_context;
pub mod handle;
pub mod list;
pub mod resource;
pub mod tcp;
pub mod traits;
pub mod ws;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export primary types
pub use chain::{chain_execute, close_chain, destroy_chain, ChainOp, CloseOp};
pub use error::{ErrorKind, Result, TransportError};
pub use error_context::{ErrorContext, ErrorRecord};
pub use handle::TransportHandle;
pub use list::TransportList;
pub use resource::{ResourceEntry, ResourceRegistry, ResourceSlot};
pub use tcp::{KeepAliveConfig, TcpConfig, TcpTransport};
pub use traits::{ConnectProgress, ConnectStatus, LayerContext, Transport};
pub use ws::{WsConfig, WsTransport};

pub use tether_common::{LinkState, Ownership, TransportId};
