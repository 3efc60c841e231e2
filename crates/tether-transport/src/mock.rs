// ============================================
// File: crates/tether-transport/src/mock.rs
// ============================================
//! # Mock Transport Layer
//!
//! ## Creation Reason
//! Lifecycle properties (destroy order, single destroy per node, no leaked
//! buffers across reconnects) are easiest to verify with a layer that
//! records every callback instead of talking to a network.
//!
//! ## Main Functionality
//! - `MockProbe`: shared recorder for events, scripted reads, captured
//!   writes, one-shot failures and live session buffers
//! - `MockTransport`: a layer that reports into a probe under a label
//! - `TrackedBuffer`: session buffer whose allocations the probe counts
//!
//! ## Usage in Tests
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tether_transport::mock::{MockOp, MockProbe, MockTransport};
//! use tether_transport::TransportHandle;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let probe = MockProbe::new();
//! let t = TransportHandle::new(Box::new(MockTransport::new("leaf", Arc::clone(&probe))), None);
//!
//! t.connect("localhost", 80, Duration::from_millis(10)).await.unwrap();
//! t.destroy().await.unwrap();
//! assert_eq!(probe.count("leaf", MockOp::Destroy), 1);
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - The mock never calls its parent; chains are walked by the chain helpers
//! - Failures are one-shot: `fail_next` affects exactly one call
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, TransportError};
use crate::resource::{try_alloc_bytes, ResourceEntry, ResourceRegistry};
use crate::traits::{ConnectStatus, LayerContext, Transport};

// ============================================
// Events
// ============================================

/// Operation observed by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `connect` was called.
    Connect,
    /// Session buffer allocation (failure injection only).
    Alloc,
    /// `read` was called.
    Read,
    /// `write` was called.
    Write,
    /// `close` was called.
    Close,
    /// `destroy` was called.
    Destroy,
    /// The layer context was dropped.
    Drop,
}

impl fmt::Display for MockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEvent {
    /// Label of the mock that produced the event.
    pub label: String,
    /// What happened.
    pub op: MockOp,
}

impl MockEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(label: impl Into<String>, op: MockOp) -> Self {
        Self {
            label: label.into(),
            op,
        }
    }
}

// ============================================
// MockProbe
// ============================================

/// Shared recorder for any number of mock layers.
#[derive(Debug, Default)]
pub struct MockProbe {
    events: Mutex<Vec<MockEvent>>,
    reads: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    written: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    failures: Mutex<HashSet<(String, MockOp)>>,
    live_buffers: AtomicUsize,
    peak_buffers: AtomicUsize,
}

impl MockProbe {
    /// Creates a probe.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns every recorded event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().clone()
    }

    /// Returns how often `label` reported `op`.
    #[must_use]
    pub fn count(&self, label: &str, op: MockOp) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.label == label && e.op == op)
            .count()
    }

    /// Forgets recorded events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Queues bytes returned by the next `read` on `label`.
    pub fn script_read(&self, label: &str, data: impl Into<Vec<u8>>) {
        self.reads
            .lock()
            .entry(label.to_string())
            .or_default()
            .push_back(data.into());
    }

    /// Returns the payloads written through `label`.
    #[must_use]
    pub fn writes_for(&self, label: &str) -> Vec<Vec<u8>> {
        self.written.lock().get(label).cloned().unwrap_or_default()
    }

    /// Makes the next `op` on `label` fail.
    pub fn fail_next(&self, label: &str, op: MockOp) {
        self.failures.lock().insert((label.to_string(), op));
    }

    /// Returns the number of session buffers currently allocated.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneously allocated buffers.
    #[must_use]
    pub fn peak_buffers(&self) -> usize {
        self.peak_buffers.load(Ordering::SeqCst)
    }

    fn record(&self, label: &str, op: MockOp) {
        self.events.lock().push(MockEvent::new(label, op));
    }

    fn take_failure(&self, label: &str, op: MockOp) -> Option<TransportError> {
        let armed = self.failures.lock().remove(&(label.to_string(), op));
        armed.then(|| match op {
            MockOp::Alloc => TransportError::allocation(format!("mock '{label}' buffer"), 0),
            _ => TransportError::io(
                format!("mock '{label}' {op}"),
                io::Error::other("injected failure"),
            ),
        })
    }

    fn pop_read(&self, label: &str) -> Option<Vec<u8>> {
        self.reads.lock().get_mut(label).and_then(VecDeque::pop_front)
    }

    fn unread(&self, label: &str, rest: Vec<u8>) {
        self.reads
            .lock()
            .entry(label.to_string())
            .or_default()
            .push_front(rest);
    }

    fn has_pending_read(&self, label: &str) -> bool {
        self.reads.lock().get(label).is_some_and(|q| !q.is_empty())
    }

    fn capture_write(&self, label: &str, data: &[u8]) {
        self.written
            .lock()
            .entry(label.to_string())
            .or_default()
            .push(data.to_vec());
    }
}

// ============================================
// TrackedBuffer
// ============================================

/// A session buffer counted by its probe while alive.
pub struct TrackedBuffer {
    data: Vec<u8>,
    probe: Arc<MockProbe>,
}

impl TrackedBuffer {
    fn allocate(probe: &Arc<MockProbe>, size: usize) -> Result<Self> {
        let data = try_alloc_bytes("mock buffer", size)?;
        let live = probe.live_buffers.fetch_add(1, Ordering::SeqCst) + 1;
        probe.peak_buffers.fetch_max(live, Ordering::SeqCst);
        Ok(Self {
            data,
            probe: Arc::clone(probe),
        })
    }

    /// Returns the buffer length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        self.probe.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================
// MockTransport
// ============================================

/// Session context of a mock layer.
pub struct MockSession {
    label: String,
    probe: Arc<MockProbe>,
    buffer: Option<TrackedBuffer>,
}

fn init_buffer(session: &mut MockSession, size: &usize) -> Result<()> {
    if let Some(err) = session.probe.take_failure(&session.label, MockOp::Alloc) {
        return Err(err);
    }
    session.buffer = Some(TrackedBuffer::allocate(&session.probe, *size)?);
    Ok(())
}

/// Scriptable transport layer reporting into a [`MockProbe`].
pub struct MockTransport {
    session: MockSession,
    resources: ResourceRegistry<MockSession, usize>,
    buffer_size: usize,
}

impl MockTransport {
    /// Creates a mock without session resources.
    #[must_use]
    pub fn new(label: impl Into<String>, probe: Arc<MockProbe>) -> Self {
        Self {
            session: MockSession {
                label: label.into(),
                probe,
                buffer: None,
            },
            resources: ResourceRegistry::new(),
            buffer_size: 0,
        }
    }

    /// Registers a session buffer of `size` bytes, allocated on connect.
    #[must_use]
    pub fn with_session_buffer(mut self, size: usize) -> Self {
        self.resources.register(
            ResourceEntry::new("buffer", |s: &mut MockSession| &mut s.buffer).with_init(init_buffer),
        );
        self.buffer_size = size;
        self
    }

    fn label(&self) -> &str {
        &self.session.label
    }

    fn probe(&self) -> &MockProbe {
        &self.session.probe
    }

    fn observe(&self, op: MockOp) -> Result<()> {
        self.probe().record(self.label(), op);
        match self.probe().take_failure(self.label(), op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn connect(
        &mut self,
        _cx: &LayerContext,
        _host: &str,
        _port: u16,
        _timeout: Duration,
    ) -> Result<ConnectStatus> {
        self.observe(MockOp::Connect)?;
        self.resources.init(&mut self.session, &self.buffer_size)?;
        Ok(ConnectStatus::Connected)
    }

    async fn read(&mut self, _cx: &LayerContext, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.observe(MockOp::Read)?;
        let Some(mut data) = self.probe().pop_read(self.label()) else {
            return Err(TransportError::timeout("mock read", timeout));
        };

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            let rest = data.split_off(n);
            self.probe().unread(self.label(), rest);
        }
        Ok(n)
    }

    async fn write(&mut self, _cx: &LayerContext, buf: &[u8], _timeout: Duration) -> Result<usize> {
        self.observe(MockOp::Write)?;
        self.probe().capture_write(self.label(), buf);
        Ok(buf.len())
    }

    async fn poll_read(&mut self, _cx: &LayerContext, _timeout: Duration) -> Result<bool> {
        Ok(self.probe().has_pending_read(self.label()))
    }

    async fn poll_write(&mut self, _cx: &LayerContext, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn close(&mut self, _cx: &LayerContext) -> Result<()> {
        let result = self.observe(MockOp::Close);
        self.resources.cleanup(&mut self.session);
        result
    }

    fn destroy(&mut self, _cx: &LayerContext) -> Result<()> {
        let result = self.observe(MockOp::Destroy);
        self.resources.cleanup(&mut self.session);
        result
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.session.probe.record(&self.session.label, MockOp::Drop);
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("label", &self.session.label)
            .field("buffer_live", &self.session.buffer.is_some())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
