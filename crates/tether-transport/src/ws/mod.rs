// ============================================
// File: crates/tether-transport/src/ws/mod.rs
// ============================================
//! # WebSocket-style Framed Layer
//!
//! ## Creation Reason
//! A wrapping layer that owns session-scoped allocations (receive buffer,
//! redirect target) and must release them on every close, not just on
//! destroy. It shows the full layer contract on top of any parent stream.
//!
//! ## Main Functionality
//! - `WsTransport`: upgrade handshake, masked frame writes, frame reads
//! - `WsConfig`: persistent options (path, headers, buffer size)
//! - `RxBuffer`: fixed-size receive buffer, a registered session resource
//!
//! ## Connect Sequence
//! ```text
//!   parent.connect ─► resources.init (buffer) ─► send upgrade request
//!        │                  │                         │
//!        ▼ Err              ▼ Err                     ▼
//!   propagate         parent.close, Err        read response head
//!                                                    │
//!                     ┌──────────────┬───────────────┤
//!                     ▼              ▼               ▼
//!                   101            3xx            other
//!                 Connected   Redirect(loc)   cleanup, parent.close, Err
//! ```
//!
//! ## Read Phases
//! `AwaitingHeader → ReadingPayload → FrameComplete → AwaitingHeader`,
//! one handler per phase. Data payload goes straight to the caller;
//! control payload is collected and handled in `FrameComplete`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - After a redirect the node is not connected but the session (buffer,
//!   redirect target, parent socket) stays live until `close`
//! - `destroy` only runs cleanup; the parent is freed by `destroy_chain`
//!
//! ## Last Modified
//! v0.1.0 - Initial framed layer

pub mod frame;
pub mod handshake;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use tether_common::Deadline;

use crate::error::{Result, TransportError};
use crate::handle::TransportHandle;
use crate::resource::{try_alloc_bytes, ResourceEntry, ResourceRegistry};
use crate::traits::{ConnectStatus, LayerContext, Transport};

use self::frame::{encode_frame, FrameHeader, Opcode, PayloadState, ReadPhase, CLOSE_NORMAL};
use self::handshake::HandshakeOutcome;

/// Budget for the courtesy close frame sent by `close`.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_millis(200);

// ============================================
// WsConfig
// ============================================

fn default_path() -> String {
    "/".to_string()
}

fn default_buffer_size() -> usize {
    2048
}

fn default_user_agent() -> String {
    concat!("tether/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_binary() -> bool {
    true
}

/// Persistent configuration of a framed layer. Survives reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsConfig {
    /// Request path.
    #[serde(default = "default_path")]
    pub path: String,
    /// Session receive buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// `Sec-WebSocket-Protocol` header value.
    #[serde(default)]
    pub sub_protocol: Option<String>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// `Authorization` header value.
    #[serde(default)]
    pub auth: Option<String>,
    /// Send binary frames (`false` sends text frames).
    #[serde(default = "default_binary")]
    pub binary: bool,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            buffer_size: default_buffer_size(),
            user_agent: default_user_agent(),
            sub_protocol: None,
            headers: BTreeMap::new(),
            auth: None,
            binary: default_binary(),
        }
    }
}

impl WsConfig {
    /// Smallest accepted receive buffer.
    pub const MIN_BUFFER_SIZE: usize = 128;
    /// Largest accepted receive buffer.
    pub const MAX_BUFFER_SIZE: usize = 65536;

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(TransportError::invalid_config("ws.path", "must start with '/'"));
        }
        if !(Self::MIN_BUFFER_SIZE..=Self::MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(TransportError::invalid_config(
                "ws.buffer_size",
                format!(
                    "must be between {} and {}",
                    Self::MIN_BUFFER_SIZE,
                    Self::MAX_BUFFER_SIZE
                ),
            ));
        }
        if self.user_agent.is_empty() {
            return Err(TransportError::invalid_config("ws.user_agent", "cannot be empty"));
        }

        let has_line_break = |s: &str| s.contains('\r') || s.contains('\n');
        let values = [Some(&self.path), Some(&self.user_agent), self.sub_protocol.as_ref(), self.auth.as_ref()];
        if values.into_iter().flatten().any(|v| has_line_break(v)) {
            return Err(TransportError::invalid_config("ws", "header values cannot contain line breaks"));
        }
        for (name, value) in &self.headers {
            if name.is_empty() || name.contains(':') || has_line_break(name) || has_line_break(value) {
                return Err(TransportError::invalid_config(
                    "ws.headers",
                    format!("invalid header '{name}'"),
                ));
            }
        }
        Ok(())
    }
}

// ============================================
// RxBuffer
// ============================================

/// Fixed-capacity receive buffer with a read cursor.
#[derive(Debug)]
pub struct RxBuffer {
    data: Vec<u8>,
    head: usize,
    tail: usize,
}

impl RxBuffer {
    /// Allocates a buffer of `size` bytes.
    ///
    /// # Errors
    /// Returns `Allocation` if the memory cannot be reserved.
    pub fn allocate(size: usize) -> Result<Self> {
        Ok(Self {
            data: try_alloc_bytes("buffer", size)?,
            head: 0,
            tail: 0,
        })
    }

    /// Returns the buffered, unconsumed bytes.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    /// Marks `n` buffered bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.head = (self.head + n).min(self.tail);
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
    }

    /// Returns the total capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no more bytes fit, even after compaction.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.tail - self.head == self.data.len()
    }

    fn spare_mut(&mut self) -> &mut [u8] {
        if self.head > 0 {
            self.data.copy_within(self.head..self.tail, 0);
            self.tail -= self.head;
            self.head = 0;
        }
        &mut self.data[self.tail..]
    }

    fn commit(&mut self, n: usize) {
        self.tail = (self.tail + n).min(self.data.len());
    }
}

/// Reads once from `parent` into the free part of `rx`.
async fn fill(rx: &mut RxBuffer, parent: &TransportHandle, deadline: &Deadline) -> Result<usize> {
    if deadline.is_expired() {
        return Err(TransportError::timeout("ws read", deadline.budget()));
    }
    let spare = rx.spare_mut();
    if spare.is_empty() {
        return Err(TransportError::protocol("receive buffer full"));
    }
    let n = parent.read(spare, deadline.remaining()).await?;
    rx.commit(n);
    Ok(n)
}

/// Writes all of `data` to `parent` within the deadline.
async fn write_all(parent: &TransportHandle, mut data: &[u8], deadline: &Deadline) -> Result<()> {
    while !data.is_empty() {
        if deadline.is_expired() {
            return Err(TransportError::timeout("ws write", deadline.budget()));
        }
        let n = parent.write(data, deadline.remaining()).await?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        data = &data[n..];
    }
    Ok(())
}

/// Sends one masked FIN frame.
async fn send_frame(parent: &TransportHandle, opcode: Opcode, payload: &[u8], deadline: &Deadline) -> Result<()> {
    let mask: [u8; 4] = rand::random();
    let frame = encode_frame(opcode, payload, Some(mask));
    trace!(?opcode, len = payload.len(), "Sending frame");
    write_all(parent, &frame, deadline).await
}

// ============================================
// WsTransport
// ============================================

/// Session state of a framed layer; empty while unconnected.
#[derive(Debug, Default)]
pub struct WsSession {
    buffer: Option<RxBuffer>,
    redirect: Option<String>,
}

fn init_buffer(session: &mut WsSession, config: &WsConfig) -> Result<()> {
    session.buffer = Some(RxBuffer::allocate(config.buffer_size)?);
    Ok(())
}

enum Step {
    Continue,
    Return(usize),
}

/// Framed layer over a parent byte stream.
///
/// # Example
/// ```ignore
/// let tcp = TransportHandle::new(Box::new(TcpTransport::new(TcpConfig::default())), None);
/// let ws = WsTransport::wrap(tcp, WsConfig::default());
///
/// match ws.connect("example.com", 80, Duration::from_secs(5)).await? {
///     ConnectStatus::Connected => { ws.write(b"hello", timeout).await?; }
///     ConnectStatus::Redirect { location, .. } => { ws.close().await?; /* follow location */ }
/// }
/// ```
pub struct WsTransport {
    config: WsConfig,
    session: WsSession,
    resources: ResourceRegistry<WsSession, WsConfig>,
    phase: ReadPhase,
    upgraded: bool,
}

impl WsTransport {
    /// Creates an unconnected framed layer.
    #[must_use]
    pub fn new(config: WsConfig) -> Self {
        let resources = ResourceRegistry::new()
            .with(ResourceEntry::new("buffer", |s: &mut WsSession| &mut s.buffer).with_init(init_buffer))
            .with(ResourceEntry::new("redirect", |s: &mut WsSession| &mut s.redirect));

        Self {
            config,
            session: WsSession::default(),
            resources,
            phase: ReadPhase::AwaitingHeader,
            upgraded: false,
        }
    }

    /// Creates a framed layer on top of `parent` and returns its node.
    #[must_use]
    pub fn wrap(parent: TransportHandle, config: WsConfig) -> TransportHandle {
        TransportHandle::new(Box::new(Self::new(config)), Some(parent))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Returns the redirect target from the last handshake, if any.
    #[must_use]
    pub fn redirect_location(&self) -> Option<&str> {
        self.session.redirect.as_deref()
    }

    fn release_session(&mut self) {
        self.resources.cleanup(&mut self.session);
        self.phase = ReadPhase::AwaitingHeader;
        self.upgraded = false;
    }

    async fn handshake(
        &mut self,
        parent: &TransportHandle,
        host: &str,
        port: u16,
        deadline: &Deadline,
    ) -> Result<HandshakeOutcome> {
        let key = handshake::generate_key();
        let request = handshake::build_request(&self.config, host, port, &key);
        write_all(parent, request.as_bytes(), deadline).await?;

        let rx = self.session.buffer.as_mut().ok_or(TransportError::NotConnected)?;
        let end = loop {
            if let Some(end) = handshake::find_head_end(rx.filled()) {
                break end;
            }
            if rx.is_full() {
                return Err(TransportError::handshake(None, "response head exceeds receive buffer"));
            }
            if fill(rx, parent, deadline).await? == 0 {
                return Err(TransportError::handshake(None, "connection closed during handshake"));
            }
        };

        let head = handshake::parse_response(&rx.filled()[..end])?;
        // Bytes after the head are already frame data
        rx.consume(end);
        debug!(status = head.status, "Upgrade response received");
        handshake::classify(&head)
    }

    // ========================================
    // Read Phase Handlers
    // ========================================

    async fn on_awaiting_header(&mut self, parent: &TransportHandle, deadline: &Deadline) -> Result<Step> {
        let rx = self.session.buffer.as_mut().ok_or(TransportError::NotConnected)?;

        if let Some((header, used)) = FrameHeader::parse(rx.filled())? {
            rx.consume(used);
            trace!(opcode = ?header.opcode, len = header.payload_len, "Frame header");
            self.phase = ReadPhase::ReadingPayload(PayloadState::new(&header));
            return Ok(Step::Continue);
        }

        if fill(rx, parent, deadline).await? == 0 {
            // Peer closed between frames
            return Ok(Step::Return(0));
        }
        Ok(Step::Continue)
    }

    async fn on_reading_payload(
        &mut self,
        parent: &TransportHandle,
        buf: &mut [u8],
        deadline: &Deadline,
    ) -> Result<Step> {
        let Self { session, phase, .. } = self;
        let rx = session.buffer.as_mut().ok_or(TransportError::NotConnected)?;
        let ReadPhase::ReadingPayload(state) = phase else {
            return Ok(Step::Continue);
        };

        if state.remaining == 0 {
            let done = state.complete();
            *phase = ReadPhase::FrameComplete(done);
            return Ok(Step::Continue);
        }

        if rx.filled().is_empty() {
            if fill(rx, parent, deadline).await? == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            return Ok(Step::Continue);
        }

        let remaining = usize::try_from(state.remaining).unwrap_or(usize::MAX);
        let available = remaining.min(rx.filled().len());

        if state.opcode.is_control() {
            let start = state.control.len();
            state.control.extend_from_slice(&rx.filled()[..available]);
            if let Some(key) = state.mask {
                frame::apply_mask(&mut state.control[start..], key, state.offset);
            }
            rx.consume(available);
            state.advance(available);
            return Ok(Step::Continue);
        }

        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&rx.filled()[..n]);
        if let Some(key) = state.mask {
            frame::apply_mask(&mut buf[..n], key, state.offset);
        }
        rx.consume(n);
        state.advance(n);

        if state.remaining == 0 {
            let done = state.complete();
            *phase = ReadPhase::FrameComplete(done);
        }
        Ok(Step::Return(n))
    }

    async fn on_frame_complete(&mut self, parent: &TransportHandle, deadline: &Deadline) -> Result<Step> {
        let ReadPhase::FrameComplete(frame) = std::mem::take(&mut self.phase) else {
            return Ok(Step::Continue);
        };

        match frame.opcode {
            Opcode::Ping => {
                trace!("Answering ping");
                send_frame(parent, Opcode::Pong, &frame.control, deadline).await?;
                Ok(Step::Continue)
            }
            Opcode::Close => {
                let code = frame
                    .control
                    .get(..2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]));
                debug!(?code, "Peer sent close frame");
                let echo = frame.control.get(..2).unwrap_or_default();
                if let Err(e) = send_frame(parent, Opcode::Close, echo, deadline).await {
                    debug!(error = %e, "Close echo not sent");
                }
                Ok(Step::Return(0))
            }
            Opcode::Pong | Opcode::Text | Opcode::Binary | Opcode::Continuation => Ok(Step::Continue),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn kind(&self) -> &'static str {
        "ws"
    }

    async fn connect(
        &mut self,
        cx: &LayerContext,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ConnectStatus> {
        let parent = cx.require_parent()?;
        let deadline = Deadline::after(timeout);

        // Reconnect: release the previous session first
        self.release_session();

        let status = parent.connect(host, port, deadline.remaining()).await?;
        if !status.is_connected() {
            return Ok(status);
        }

        if let Err(e) = self.resources.init(&mut self.session, &self.config) {
            if let Err(close_err) = parent.close().await {
                debug!(error = %close_err, "Parent close after failed init also failed");
            }
            return Err(e);
        }

        match self.handshake(parent, host, port, &deadline).await {
            Ok(HandshakeOutcome::Upgraded) => {
                self.upgraded = true;
                debug!(transport = %cx.id(), host, port, path = %self.config.path, "Upgrade complete");
                Ok(ConnectStatus::Connected)
            }
            Ok(HandshakeOutcome::Redirect { code, location }) => {
                debug!(transport = %cx.id(), code, %location, "Upgrade redirected");
                self.session.redirect = Some(location.clone());
                self.resources.mark_initialized(&mut self.session, "redirect")?;
                Ok(ConnectStatus::Redirect { code, location })
            }
            Err(e) => {
                self.release_session();
                if let Err(close_err) = parent.close().await {
                    debug!(error = %close_err, "Parent close after failed handshake also failed");
                }
                Err(e)
            }
        }
    }

    async fn read(&mut self, cx: &LayerContext, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let parent = cx.require_parent()?;
        if !self.upgraded {
            return Err(TransportError::NotConnected);
        }
        if buf.is_empty() {
            return Err(TransportError::invalid_argument("read buffer is empty"));
        }

        let deadline = Deadline::after(timeout);
        loop {
            let step = match self.phase {
                ReadPhase::AwaitingHeader => self.on_awaiting_header(parent, &deadline).await?,
                ReadPhase::ReadingPayload(_) => self.on_reading_payload(parent, buf, &deadline).await?,
                ReadPhase::FrameComplete(_) => self.on_frame_complete(parent, &deadline).await?,
            };
            if let Step::Return(n) = step {
                return Ok(n);
            }
        }
    }

    async fn write(&mut self, cx: &LayerContext, buf: &[u8], timeout: Duration) -> Result<usize> {
        let parent = cx.require_parent()?;
        if !self.upgraded {
            return Err(TransportError::NotConnected);
        }

        let opcode = if self.config.binary { Opcode::Binary } else { Opcode::Text };
        send_frame(parent, opcode, buf, &Deadline::after(timeout)).await?;
        Ok(buf.len())
    }

    async fn poll_read(&mut self, cx: &LayerContext, timeout: Duration) -> Result<bool> {
        let buffered = self
            .session
            .buffer
            .as_ref()
            .is_some_and(|rx| !rx.filled().is_empty());
        if buffered {
            return Ok(true);
        }
        cx.require_parent()?.poll_read(timeout).await
    }

    async fn poll_write(&mut self, cx: &LayerContext, timeout: Duration) -> Result<bool> {
        cx.require_parent()?.poll_write(timeout).await
    }

    async fn close(&mut self, cx: &LayerContext) -> Result<()> {
        let parent = cx.require_parent()?;

        if self.upgraded && parent.is_connected() {
            let deadline = Deadline::after(CLOSE_FRAME_TIMEOUT);
            if let Err(e) = send_frame(parent, Opcode::Close, &CLOSE_NORMAL.to_be_bytes(), &deadline).await {
                debug!(error = %e, "Close frame not sent");
            }
        }

        self.release_session();
        trace!(transport = %cx.id(), "Session resources released");
        parent.close().await
    }

    fn destroy(&mut self, cx: &LayerContext) -> Result<()> {
        if self.resources.live_count() > 0 {
            warn!(transport = %cx.id(), "Destroying framed layer with a live session");
        }
        self.release_session();
        Ok(())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::{MockOp, MockProbe, MockTransport};
    use tether_common::LinkState;

    const TIMEOUT: Duration = Duration::from_millis(200);
    const UPGRADED: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";

    fn stack(probe: &Arc<MockProbe>, config: WsConfig) -> (TransportHandle, TransportHandle) {
        let leaf = TransportHandle::new(Box::new(MockTransport::new("leaf", Arc::clone(probe))), None);
        let ws = WsTransport::wrap(leaf.clone(), config);
        (leaf, ws)
    }

    fn server_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        encode_frame(opcode, payload, None).to_vec()
    }

    /// Decodes a client frame captured by the mock.
    fn decode_client_frame(raw: &[u8]) -> (Opcode, Vec<u8>) {
        let (header, used) = FrameHeader::parse(raw).unwrap().unwrap();
        let mut payload = raw[used..].to_vec();
        frame::apply_mask(&mut payload, header.mask.unwrap(), 0);
        (header.opcode, payload)
    }

    async fn connected(probe: &Arc<MockProbe>) -> (TransportHandle, TransportHandle) {
        let (leaf, ws) = stack(probe, WsConfig::default());
        probe.script_read("leaf", UPGRADED);
        assert_eq!(ws.connect("example.com", 80, TIMEOUT).await.unwrap(), ConnectStatus::Connected);
        (leaf, ws)
    }

    #[tokio::test]
    async fn test_handshake_request() {
        let probe = MockProbe::new();
        let (leaf, ws) = connected(&probe).await;

        let request = String::from_utf8(probe.writes_for("leaf").remove(0)).unwrap();
        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: "));
        assert!(ws.is_connected());
        assert!(leaf.is_connected());
    }

    #[tokio::test]
    async fn test_unbounded_timeout() {
        let probe = MockProbe::new();
        let (_leaf, ws) = stack(&probe, WsConfig::default());

        probe.script_read("leaf", UPGRADED);
        assert_eq!(
            ws.connect("example.com", 80, Duration::MAX).await.unwrap(),
            ConnectStatus::Connected
        );
        assert_eq!(ws.write(b"hello", Duration::MAX).await.unwrap(), 5);

        probe.script_read("leaf", server_frame(Opcode::Text, b"world"));
        let mut buf = [0u8; 16];
        let n = ws.read(&mut buf, Duration::MAX).await.unwrap();
        assert_eq!(&buf[..n], b"world");

        ws.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_data_after_head_is_buffered() {
        let probe = MockProbe::new();
        let (_leaf, ws) = stack(&probe, WsConfig::default());

        let mut response = UPGRADED.to_vec();
        response.extend(server_frame(Opcode::Text, b"hi"));
        probe.script_read("leaf", response);

        ws.connect("example.com", 80, TIMEOUT).await.unwrap();
        assert!(ws.poll_read(TIMEOUT).await.unwrap());

        let mut buf = [0u8; 16];
        let n = ws.read(&mut buf, TIMEOUT).await.unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[tokio::test]
    async fn test_large_frame_in_chunks() {
        let probe = MockProbe::new();
        let (_leaf, ws) = connected(&probe).await;

        let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let frame = server_frame(Opcode::Binary, &payload);
        for chunk in frame.chunks(64) {
            probe.script_read("leaf", chunk.to_vec());
        }

        let mut received = Vec::new();
        let mut buf = [0u8; 100];
        while received.len() < payload.len() {
            let n = ws.read(&mut buf, TIMEOUT).await.unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_write_sends_masked_frame() {
        let probe = MockProbe::new();
        let (_leaf, ws) = connected(&probe).await;

        assert_eq!(ws.write(b"payload", TIMEOUT).await.unwrap(), 7);

        let raw = probe.writes_for("leaf").pop().unwrap();
        assert_eq!(raw[1] & 0x80, 0x80);
        assert_eq!(decode_client_frame(&raw), (Opcode::Binary, b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let probe = MockProbe::new();
        let (_leaf, ws) = connected(&probe).await;

        let mut script = server_frame(Opcode::Ping, b"beat");
        script.extend(server_frame(Opcode::Binary, b"data"));
        probe.script_read("leaf", script);

        let mut buf = [0u8; 16];
        let n = ws.read(&mut buf, TIMEOUT).await.unwrap();
        assert_eq!(&buf[..n], b"data");

        let pong = probe.writes_for("leaf").pop().unwrap();
        assert_eq!(decode_client_frame(&pong), (Opcode::Pong, b"beat".to_vec()));
    }

    #[tokio::test]
    async fn test_close_frame_ends_stream() {
        let probe = MockProbe::new();
        let (_leaf, ws) = connected(&probe).await;

        probe.script_read("leaf", server_frame(Opcode::Close, &1001u16.to_be_bytes()));

        let mut buf = [0u8; 16];
        assert_eq!(ws.read(&mut buf, TIMEOUT).await.unwrap(), 0);

        let echo = probe.writes_for("leaf").pop().unwrap();
        assert_eq!(decode_client_frame(&echo), (Opcode::Close, 1001u16.to_be_bytes().to_vec()));
    }

    #[tokio::test]
    async fn test_redirect_keeps_session_until_close() {
        let probe = MockProbe::new();
        let (leaf, ws) = stack(&probe, WsConfig::default());
        probe.script_read("leaf", b"HTTP/1.1 302 Found\r\nLocation: ws://other.example.com/\r\n\r\n".to_vec());

        let status = ws.connect("example.com", 80, TIMEOUT).await.unwrap();
        assert_eq!(
            status,
            ConnectStatus::Redirect {
                code: 302,
                location: "ws://other.example.com/".into()
            }
        );
        assert_eq!(status.code(), 302);
        assert_eq!(ws.state(), LinkState::Unconnected);
        assert!(matches!(ws.write(b"x", TIMEOUT).await, Err(TransportError::NotConnected)));

        ws.close().await.unwrap();
        assert_eq!(probe.count("leaf", MockOp::Close), 1);
        assert!(!leaf.is_connected());
    }

    #[tokio::test]
    async fn test_rejected_upgrade_closes_parent() {
        let probe = MockProbe::new();
        let (leaf, ws) = stack(&probe, WsConfig::default());
        probe.script_read("leaf", b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n".to_vec());

        let err = ws.connect("example.com", 80, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::Handshake { status: Some(403), .. }));
        assert_eq!(probe.count("leaf", MockOp::Close), 1);
        assert!(!leaf.is_connected());

        let record = ws.last_error().unwrap();
        assert_eq!(record.layer, "ws");
        assert_eq!(record.status, Some(403));
    }

    #[tokio::test]
    async fn test_parent_failure_propagates() {
        let probe = MockProbe::new();
        let (_leaf, ws) = stack(&probe, WsConfig::default());
        probe.fail_next("leaf", MockOp::Connect);

        assert!(ws.connect("example.com", 80, TIMEOUT).await.is_err());
        assert!(probe.writes_for("leaf").is_empty());
    }

    #[tokio::test]
    async fn test_buffer_allocation_failure_closes_parent() {
        let probe = MockProbe::new();
        let config = WsConfig {
            buffer_size: usize::MAX,
            ..WsConfig::default()
        };
        let (leaf, ws) = stack(&probe, config);

        let err = ws.connect("example.com", 80, TIMEOUT).await.unwrap_err();
        assert!(err.is_allocation_failure());
        assert_eq!(probe.count("leaf", MockOp::Close), 1);
        assert!(!leaf.is_connected());
        assert!(probe.writes_for("leaf").is_empty());
    }

    #[tokio::test]
    async fn test_close_sends_close_frame_and_reconnects() {
        let probe = MockProbe::new();
        let (leaf, ws) = connected(&probe).await;

        ws.close().await.unwrap();
        let close = probe.writes_for("leaf").pop().unwrap();
        assert_eq!(decode_client_frame(&close), (Opcode::Close, CLOSE_NORMAL.to_be_bytes().to_vec()));
        assert!(!leaf.is_connected());

        for _ in 0..10 {
            probe.script_read("leaf", UPGRADED);
            ws.connect("example.com", 80, TIMEOUT).await.unwrap();
            ws.close().await.unwrap();
        }
        assert_eq!(probe.count("leaf", MockOp::Connect), 11);
    }

    #[tokio::test]
    async fn test_destroy_does_not_touch_parent() {
        let probe = MockProbe::new();
        let (leaf, ws) = connected(&probe).await;

        ws.destroy().await.unwrap();
        assert_eq!(probe.count("leaf", MockOp::Close), 0);
        assert_eq!(probe.count("leaf", MockOp::Destroy), 0);
        assert!(leaf.is_connected());
    }

    #[test]
    fn test_config_validation() {
        assert!(WsConfig::default().validate().is_ok());

        let bad_path = WsConfig {
            path: "chat".into(),
            ..WsConfig::default()
        };
        assert!(bad_path.validate().is_err());

        let tiny = WsConfig {
            buffer_size: 16,
            ..WsConfig::default()
        };
        assert!(tiny.validate().is_err());

        let mut injected = WsConfig::default();
        injected.headers.insert("X-Evil".into(), "a\r\nHost: b".into());
        assert!(injected.validate().is_err());
    }

    #[test]
    fn test_rx_buffer_compaction() {
        let mut rx = RxBuffer::allocate(8).unwrap();
        rx.spare_mut()[..6].copy_from_slice(b"abcdef");
        rx.commit(6);
        rx.consume(4);
        assert_eq!(rx.filled(), b"ef");

        assert_eq!(rx.spare_mut().len(), 6);
        assert_eq!(rx.filled(), b"ef");
        assert!(!rx.is_full());
        assert_eq!(rx.capacity(), 8);
    }
}
