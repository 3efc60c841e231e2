// ============================================
// File: crates/tether-transport/src/handle.rs
// ============================================
//! # Transport Handle
//!
//! ## Creation Reason
//! A chain node must be reachable from several places at once: the child
//! that wraps it, a transport list entry, the application. `TransportHandle`
//! is the cheap clonable reference all of them share, and the single place
//! where node state (connected, freed) is enforced.
//!
//! ## Main Functionality
//! - Dispatches connect / read / write / poll / close to the boxed layer
//! - Tracks `LinkState` and rejects I/O on unconnected or freed nodes
//! - Records failures into the chain's shared `ErrorContext`
//! - One-shot destroy: the layer box is taken exactly once
//!
//! ## Node Layout
//! ```text
//!   TransportHandle ──Arc──► TransportItem
//!                             ├── cx: LayerContext { id, parent, errors }
//!                             ├── kind, scheme, ownership, state
//!                             └── layer: Option<Box<dyn Transport>>
//!                                        └── None once freed (tombstone)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The parent link lives in `cx` and is never replaced
//! - `destroy` frees only this node; use `chain::destroy_chain` for ancestors
//! - Never hold the state lock across an `.await`
//!
//! ## Last Modified
//! v0.1.0 - Initial handle implementation

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use tether_common::{LinkState, Ownership, TransportId};

use crate::error::{Result, TransportError};
use crate::error_context::{ErrorContext, ErrorRecord};
use crate::traits::{ConnectProgress, ConnectStatus, LayerContext, Transport};

// ============================================
// TransportItem
// ============================================

struct TransportItem {
    cx: LayerContext,
    kind: &'static str,
    scheme: Mutex<Option<String>>,
    ownership: Mutex<Ownership>,
    state: Mutex<LinkState>,
    layer: AsyncMutex<Option<Box<dyn Transport>>>,
}

impl Drop for TransportItem {
    fn drop(&mut self) {
        if self.layer.get_mut().is_some() {
            debug!(
                transport = %self.cx.id(),
                layer = self.kind,
                "Transport dropped without destroy, releasing layer"
            );
        }
    }
}

// ============================================
// TransportHandle
// ============================================

/// Shared reference to one node of a transport chain.
///
/// # Example
/// ```ignore
/// let leaf = TransportHandle::new(Box::new(TcpTransport::new(TcpConfig::default())), None);
/// let framed = TransportHandle::new(Box::new(WsTransport::new(WsConfig::default())), Some(leaf.clone()));
/// assert!(framed.parent().is_some());
/// ```
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<TransportItem>,
}

impl TransportHandle {
    /// Creates a node for `layer` on top of `parent`.
    ///
    /// The node shares its parent's error context; a leaf gets a fresh one.
    #[must_use]
    pub fn new(layer: Box<dyn Transport>, parent: Option<TransportHandle>) -> Self {
        let errors = parent
            .as_ref()
            .map_or_else(|| Arc::new(ErrorContext::new()), |p| Arc::clone(p.errors()));
        Self::with_error_context(layer, parent, errors)
    }

    /// Creates a node with an explicitly supplied error context.
    #[must_use]
    pub fn with_error_context(
        layer: Box<dyn Transport>,
        parent: Option<TransportHandle>,
        errors: Arc<ErrorContext>,
    ) -> Self {
        let id = TransportId::next();
        let kind = layer.kind();
        debug!(
            transport = %id,
            layer = kind,
            parent = ?parent.as_ref().map(TransportHandle::id),
            "Created transport"
        );

        Self {
            inner: Arc::new(TransportItem {
                cx: LayerContext::new(id, parent, errors),
                kind,
                scheme: Mutex::new(None),
                ownership: Mutex::new(Ownership::default()),
                state: Mutex::new(LinkState::Unconnected),
                layer: AsyncMutex::new(Some(layer)),
            }),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    /// Returns the node identifier.
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.inner.cx.id()
    }

    /// Returns the layer kind (e.g. `"tcp"`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.inner.kind
    }

    /// Returns the parent node, if any.
    #[must_use]
    pub fn parent(&self) -> Option<TransportHandle> {
        self.inner.cx.parent().cloned()
    }

    /// Returns the scheme key assigned by a transport list.
    #[must_use]
    pub fn scheme(&self) -> Option<String> {
        self.inner.scheme.lock().clone()
    }

    /// Returns the ownership tag assigned by a transport list.
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        *self.inner.ownership.lock()
    }

    /// Returns the current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.inner.state.lock()
    }

    /// Returns `true` once the node has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state().is_freed()
    }

    /// Returns `true` while a session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the error context shared along this chain.
    #[must_use]
    pub fn errors(&self) -> &Arc<ErrorContext> {
        self.inner.cx.errors()
    }

    /// Returns the most recent failure recorded anywhere on the chain.
    #[must_use]
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.errors().last()
    }

    /// Returns `true` if both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` if this handle is the only reference to the node.
    pub(crate) fn is_sole_owner(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    pub(crate) fn set_listing(&self, scheme: String, ownership: Ownership) {
        *self.inner.scheme.lock() = Some(scheme);
        *self.inner.ownership.lock() = ownership;
    }

    pub(crate) fn clear_scheme(&self) {
        self.inner.scheme.lock().take();
    }

    // ========================================
    // Operations
    // ========================================

    /// Connects this node (and, through the layer, its parents).
    ///
    /// # Errors
    /// - `Destroyed` if the node has been freed
    /// - Any layer error; the node is left unconnected
    pub async fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<ConnectStatus> {
        let result = self.connect_inner(host, port, timeout).await;
        self.track("connect", result)
    }

    async fn connect_inner(&self, host: &str, port: u16, timeout: Duration) -> Result<ConnectStatus> {
        let mut guard = self.inner.layer.lock().await;
        let layer = guard.as_mut().ok_or_else(|| self.destroyed())?;

        debug!(transport = %self.id(), layer = self.kind(), host, port, "Connecting");
        let result = layer.connect(&self.inner.cx, host, port, timeout).await;
        self.set_state(match &result {
            Ok(ConnectStatus::Connected) => LinkState::Connected,
            _ => LinkState::Unconnected,
        });
        result
    }

    /// Starts a connect that may complete later.
    ///
    /// # Errors
    /// Same as [`TransportHandle::connect`].
    pub async fn connect_async(&self, host: &str, port: u16, timeout: Duration) -> Result<ConnectProgress> {
        let result = self.connect_async_inner(host, port, timeout).await;
        self.track("connect_async", result)
    }

    async fn connect_async_inner(&self, host: &str, port: u16, timeout: Duration) -> Result<ConnectProgress> {
        let mut guard = self.inner.layer.lock().await;
        let layer = guard.as_mut().ok_or_else(|| self.destroyed())?;

        let result = layer.connect_async(&self.inner.cx, host, port, timeout).await;
        if let Ok(ConnectProgress::Done(status)) = &result {
            self.set_state(if status.is_connected() {
                LinkState::Connected
            } else {
                LinkState::Unconnected
            });
        }
        result
    }

    /// Reads into `buf`. `Ok(0)` means the peer closed.
    ///
    /// # Errors
    /// - `NotConnected` / `Destroyed` for a node without a session
    /// - `Timeout` when nothing arrived within `timeout`
    pub async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let result = self.read_inner(buf, timeout).await;
        self.track("read", result)
    }

    async fn read_inner(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.ensure_connected()?;
        let mut guard = self.inner.layer.lock().await;
        let layer = guard.as_mut().ok_or_else(|| self.destroyed())?;

        let n = layer.read(&self.inner.cx, buf, timeout).await?;
        trace!(transport = %self.id(), layer = self.kind(), bytes = n, "Read");
        Ok(n)
    }

    /// Writes `buf`, returning the number of payload bytes accepted.
    ///
    /// # Errors
    /// - `NotConnected` / `Destroyed` for a node without a session
    /// - I/O or timeout errors from the lowest layer
    pub async fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize> {
        let result = self.write_inner(buf, timeout).await;
        self.track("write", result)
    }

    async fn write_inner(&self, buf: &[u8], timeout: Duration) -> Result<usize> {
        self.ensure_connected()?;
        let mut guard = self.inner.layer.lock().await;
        let layer = guard.as_mut().ok_or_else(|| self.destroyed())?;

        let n = layer.write(&self.inner.cx, buf, timeout).await?;
        trace!(transport = %self.id(), layer = self.kind(), bytes = n, "Wrote");
        Ok(n)
    }

    /// Waits up to `timeout` for readability.
    ///
    /// # Errors
    /// `NotConnected` / `Destroyed` for a node without a session.
    pub async fn poll_read(&self, timeout: Duration) -> Result<bool> {
        let result = self.poll_inner(true, timeout).await;
        self.track("poll_read", result)
    }

    /// Waits up to `timeout` for writability.
    ///
    /// # Errors
    /// `NotConnected` / `Destroyed` for a node without a session.
    pub async fn poll_write(&self, timeout: Duration) -> Result<bool> {
        let result = self.poll_inner(false, timeout).await;
        self.track("poll_write", result)
    }

    async fn poll_inner(&self, readable: bool, timeout: Duration) -> Result<bool> {
        self.ensure_connected()?;
        let mut guard = self.inner.layer.lock().await;
        let layer = guard.as_mut().ok_or_else(|| self.destroyed())?;

        if readable {
            layer.poll_read(&self.inner.cx, timeout).await
        } else {
            layer.poll_write(&self.inner.cx, timeout).await
        }
    }

    /// Closes the session. Safe on a node that never connected.
    ///
    /// # Errors
    /// - `Destroyed` if the node has been freed
    /// - A parent close failure; the node is unconnected regardless
    pub async fn close(&self) -> Result<()> {
        let result = self.close_inner().await;
        self.track("close", result)
    }

    async fn close_inner(&self) -> Result<()> {
        let mut guard = self.inner.layer.lock().await;
        let layer = guard.as_mut().ok_or_else(|| self.destroyed())?;

        let result = layer.close(&self.inner.cx).await;
        self.set_state(LinkState::Unconnected);
        debug!(transport = %self.id(), layer = self.kind(), "Closed");
        result
    }

    /// Destroys this node only. The parent is left untouched.
    ///
    /// # Errors
    /// - `Destroyed` on a second call
    /// - The layer's destroy error; the node is freed regardless
    pub async fn destroy(&self) -> Result<()> {
        match self.free().await {
            Some(result) => result,
            None => Err(self.destroyed()),
        }
    }

    /// Frees the node once. Returns `None` if it was already freed.
    pub(crate) async fn free(&self) -> Option<Result<()>> {
        let mut layer = self.inner.layer.lock().await.take()?;
        self.set_state(LinkState::Freed);

        let result = layer.destroy(&self.inner.cx);
        drop(layer);
        self.clear_scheme();
        debug!(transport = %self.id(), layer = self.kind(), "Destroyed transport");

        Some(self.track("destroy", result))
    }

    // ========================================
    // Internal Helpers
    // ========================================

    fn destroyed(&self) -> TransportError {
        TransportError::Destroyed { id: self.id() }
    }

    fn set_state(&self, state: LinkState) {
        let mut current = self.inner.state.lock();
        if !current.is_freed() {
            *current = state;
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            LinkState::Connected => Ok(()),
            LinkState::Unconnected => Err(TransportError::NotConnected),
            LinkState::Freed => Err(self.destroyed()),
        }
    }

    fn track<T>(&self, op: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            debug!(transport = %self.id(), layer = self.kind(), op, error = %e, "Transport operation failed");
            self.errors().record(self.kind(), self.id(), e);
        }
        result
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("scheme", &self.scheme())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOp, MockProbe, MockTransport};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn mock(label: &str, probe: &Arc<MockProbe>, parent: Option<TransportHandle>) -> TransportHandle {
        TransportHandle::new(Box::new(MockTransport::new(label, Arc::clone(probe))), parent)
    }

    #[tokio::test]
    async fn test_io_requires_connect() {
        let probe = MockProbe::new();
        let t = mock("a", &probe, None);
        let mut buf = [0u8; 8];

        assert!(matches!(t.read(&mut buf, TIMEOUT).await, Err(TransportError::NotConnected)));
        assert!(matches!(t.write(b"x", TIMEOUT).await, Err(TransportError::NotConnected)));
        assert_eq!(probe.count("a", MockOp::Read), 0);

        assert_eq!(t.connect("host", 1, TIMEOUT).await.unwrap(), ConnectStatus::Connected);
        assert!(t.is_connected());
        assert_eq!(t.write(b"hello", TIMEOUT).await.unwrap(), 5);

        t.close().await.unwrap();
        assert_eq!(t.state(), LinkState::Unconnected);
        assert!(t.write(b"x", TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_async_completes_inline() {
        let probe = MockProbe::new();
        let t = mock("a", &probe, None);

        let progress = t.connect_async("host", 1, TIMEOUT).await.unwrap();
        assert_eq!(progress, ConnectProgress::Done(ConnectStatus::Connected));
        assert!(t.is_connected());
        assert_eq!(probe.count("a", MockOp::Connect), 1);

        t.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_once() {
        let probe = MockProbe::new();
        let t = mock("a", &probe, None);

        t.destroy().await.unwrap();
        assert!(t.is_destroyed());
        assert_eq!(probe.count("a", MockOp::Destroy), 1);
        assert_eq!(probe.count("a", MockOp::Drop), 1);

        let err = t.destroy().await.unwrap_err();
        assert!(matches!(err, TransportError::Destroyed { .. }));
        assert!(t.connect("host", 1, TIMEOUT).await.is_err());
        assert!(t.close().await.is_err());
        assert_eq!(probe.count("a", MockOp::Destroy), 1);
    }

    #[tokio::test]
    async fn test_destroy_leaves_parent() {
        let probe = MockProbe::new();
        let parent = mock("p", &probe, None);
        let child = mock("c", &probe, Some(parent.clone()));

        child.destroy().await.unwrap();
        assert!(!parent.is_destroyed());
        assert!(child.parent().unwrap().ptr_eq(&parent));
        assert_eq!(probe.count("p", MockOp::Destroy), 0);
    }

    #[tokio::test]
    async fn test_error_context_shared_with_parent() {
        let probe = MockProbe::new();
        let parent = mock("p", &probe, None);
        let child = mock("c", &probe, Some(parent.clone()));
        assert!(Arc::ptr_eq(parent.errors(), child.errors()));

        probe.fail_next("p", MockOp::Connect);
        assert!(parent.connect("host", 1, TIMEOUT).await.is_err());

        let record = child.last_error().unwrap();
        assert_eq!(record.layer, "mock");
        assert_eq!(record.transport, parent.id());
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_unconnected() {
        let probe = MockProbe::new();
        let t = mock("a", &probe, None);
        t.connect("host", 1, TIMEOUT).await.unwrap();

        probe.fail_next("a", MockOp::Connect);
        assert!(t.connect("host", 1, TIMEOUT).await.is_err());
        assert_eq!(t.state(), LinkState::Unconnected);
    }

    #[tokio::test]
    async fn test_dropped_without_destroy_releases_layer() {
        let probe = MockProbe::new();
        drop(mock("a", &probe, None));
        assert_eq!(probe.count("a", MockOp::Drop), 1);
        assert_eq!(probe.count("a", MockOp::Destroy), 0);
    }
}
