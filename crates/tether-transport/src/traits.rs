// ============================================
// File: crates/tether-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the per-layer interface every protocol layer implements, so a
//! chain can be assembled from any mix of layers (TCP, framed, mock) and
//! driven through one handle type.
//!
//! ## Main Functionality
//! - `Transport`: connect / read / write / poll / close / destroy slots
//! - `LayerContext`: what a layer may see of its own node (id, parent, errors)
//! - `ConnectStatus` / `ConnectProgress`: layer-specific connect outcomes
//!
//! ## Layer Contract
//! ```text
//!   connect  ─► parent.connect ─► resources.init ─► own handshake
//!   close    ─► resources.cleanup ─► parent.close
//!   destroy  ─► resources.cleanup            (never touches the parent)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Layers never call `destroy` on their parent; `destroy_chain` walks it
//! - `close` must be safe after a failed or partial `connect`
//! - Layers are only reached through `TransportHandle`, which serialises
//!   calls per node; no internal locking is required inside a layer
//! - No built-in layer overrides `connect_async`; it always completes the
//!   blocking connect, so `ConnectProgress::InProgress` is never returned today
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tether_common::TransportId;

use crate::error::{Result, TransportError};
use crate::error_context::ErrorContext;
use crate::handle::TransportHandle;

// ============================================
// ConnectStatus
// ============================================

/// Successful outcome of a layer's `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Session established; I/O may proceed.
    Connected,
    /// Peer asked the caller to reconnect elsewhere.
    ///
    /// The node stays unconnected; call `close` before reusing it.
    Redirect {
        /// Protocol status code (e.g. 302)
        code: u16,
        /// Redirect target as sent by the peer
        location: String,
    },
}

impl ConnectStatus {
    /// Returns the numeric status: 0 for success, the protocol code otherwise.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Connected => 0,
            Self::Redirect { code, .. } => *code,
        }
    }

    /// Returns `true` if the session is established.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Outcome of `connect_async`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectProgress {
    /// Connect finished with the given status.
    Done(ConnectStatus),
    /// Connect was started but has not completed yet; poll for writability.
    InProgress,
}

// ============================================
// LayerContext
// ============================================

/// The parts of a chain node a layer implementation may use.
///
/// Built once by [`TransportHandle::new`]; the parent link never changes
/// after construction.
#[derive(Clone)]
pub struct LayerContext {
    id: TransportId,
    parent: Option<TransportHandle>,
    errors: Arc<ErrorContext>,
}

impl LayerContext {
    pub(crate) fn new(
        id: TransportId,
        parent: Option<TransportHandle>,
        errors: Arc<ErrorContext>,
    ) -> Self {
        Self { id, parent, errors }
    }

    /// Returns the node identifier.
    #[must_use]
    pub const fn id(&self) -> TransportId {
        self.id
    }

    /// Returns the parent transport, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<&TransportHandle> {
        self.parent.as_ref()
    }

    /// Returns the parent transport or an argument error for leaf-only use.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when the node has no parent.
    pub fn require_parent(&self) -> Result<&TransportHandle> {
        self.parent
            .as_ref()
            .ok_or_else(|| TransportError::invalid_argument(format!("{} has no parent transport", self.id)))
    }

    /// Returns the error context shared along the chain.
    #[must_use]
    pub fn errors(&self) -> &Arc<ErrorContext> {
        &self.errors
    }
}

impl std::fmt::Debug for LayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerContext")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(TransportHandle::id))
            .finish_non_exhaustive()
    }
}

// ============================================
// Transport Trait
// ============================================

/// One layer of a protocol stack.
///
/// # Purpose
/// Implementations hold the layer's persistent configuration and its
/// session context. Session resources are declared in a
/// [`ResourceRegistry`](crate::resource::ResourceRegistry) so that `close`
/// and `destroy` release them idempotently.
///
/// # Timeouts
/// Every blocking slot takes its own advisory timeout. A layer that needs
/// several parent calls for one step splits the budget with
/// [`Deadline`](tether_common::Deadline).
///
/// # Example
/// ```ignore
/// let tcp = TransportHandle::new(Box::new(TcpTransport::new(TcpConfig::default())), None);
/// let ws = WsTransport::wrap(tcp.clone(), WsConfig::default());
/// ws.connect("echo.example.com", 80, Duration::from_secs(5)).await?;
/// ws.write(b"hello", Duration::from_secs(1)).await?;
/// ```
#[async_trait]
pub trait Transport: Send {
    /// Short layer name used in logs and error records (e.g. `"tcp"`).
    fn kind(&self) -> &'static str;

    /// Establishes the session, connecting the parent first for wrapping layers.
    ///
    /// # Errors
    /// Parent failures are propagated; allocation failures leave no
    /// session resources behind.
    async fn connect(
        &mut self,
        cx: &LayerContext,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ConnectStatus>;

    /// Starts a connect that may complete later.
    ///
    /// The default implementation runs the blocking `connect`.
    ///
    /// # Errors
    /// Same as [`Transport::connect`].
    async fn connect_async(
        &mut self,
        cx: &LayerContext,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ConnectProgress> {
        self.connect(cx, host, port, timeout)
            .await
            .map(ConnectProgress::Done)
    }

    /// Reads at most `buf.len()` bytes. `Ok(0)` means the peer closed.
    ///
    /// # Errors
    /// Returns `Timeout` when nothing arrived within `timeout`.
    async fn read(&mut self, cx: &LayerContext, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Writes `buf`, returning the number of payload bytes accepted.
    ///
    /// # Errors
    /// Returns an I/O or timeout error from the lowest layer.
    async fn write(&mut self, cx: &LayerContext, buf: &[u8], timeout: Duration) -> Result<usize>;

    /// Waits up to `timeout` for readability. `Ok(false)` means not ready.
    ///
    /// # Errors
    /// Returns an error if the underlying readiness check fails.
    async fn poll_read(&mut self, cx: &LayerContext, timeout: Duration) -> Result<bool>;

    /// Waits up to `timeout` for writability. `Ok(false)` means not ready.
    ///
    /// # Errors
    /// Returns an error if the underlying readiness check fails.
    async fn poll_write(&mut self, cx: &LayerContext, timeout: Duration) -> Result<bool>;

    /// Releases session resources, then closes the parent.
    ///
    /// # Errors
    /// Cleanup always completes; only the parent close can fail.
    async fn close(&mut self, cx: &LayerContext) -> Result<()>;

    /// Releases session resources before the layer is dropped.
    ///
    /// Must not touch the parent.
    ///
    /// # Errors
    /// Reported for logging only; the layer is dropped regardless.
    fn destroy(&mut self, cx: &LayerContext) -> Result<()>;
}

// ============================================
// Tests
// ============================================
