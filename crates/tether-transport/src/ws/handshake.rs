// ============================================
// File: crates/tether-transport/src/ws/handshake.rs
// ============================================
//! # Upgrade Handshake
//!
//! ## Creation Reason
//! Builds the HTTP/1.1 upgrade request and classifies the response head
//! into upgraded / redirect / rejected.
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Sec-WebSocket-Accept` is not verified
//! - Header names compare case-insensitively; values are trimmed
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake helpers

use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Result, TransportError};
use crate::ws::WsConfig;

/// Status codes treated as redirects.
const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Generates a random base64 `Sec-WebSocket-Key`.
#[must_use]
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    STANDARD.encode(nonce)
}

/// Builds the upgrade request for `host:port`.
#[must_use]
pub fn build_request(config: &WsConfig, host: &str, port: u16, key: &str) -> String {
    let mut req = String::with_capacity(256);

    // Writing into a String cannot fail
    let _ = write!(req, "GET {} HTTP/1.1\r\n", config.path);
    if port == 80 || port == 443 {
        let _ = write!(req, "Host: {host}\r\n");
    } else {
        let _ = write!(req, "Host: {host}:{port}\r\n");
    }
    let _ = write!(req, "User-Agent: {}\r\n", config.user_agent);
    req.push_str("Upgrade: websocket\r\n");
    req.push_str("Connection: Upgrade\r\n");
    let _ = write!(req, "Sec-WebSocket-Key: {key}\r\n");
    req.push_str("Sec-WebSocket-Version: 13\r\n");
    if let Some(protocol) = &config.sub_protocol {
        let _ = write!(req, "Sec-WebSocket-Protocol: {protocol}\r\n");
    }
    if let Some(auth) = &config.auth {
        let _ = write!(req, "Authorization: {auth}\r\n");
    }
    for (name, value) in &config.headers {
        let _ = write!(req, "{name}: {value}\r\n");
    }
    req.push_str("\r\n");
    req
}

/// Returns the length of the response head including the blank line.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parsed HTTP response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code.
    pub status: u16,
    /// Header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Returns the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parses a response head as located by [`find_head_end`].
///
/// # Errors
/// Returns `Handshake` for a malformed status line or header.
pub fn parse_response(head: &[u8]) -> Result<ResponseHead> {
    let text = std::str::from_utf8(head)
        .map_err(|_| TransportError::handshake(None, "response head is not valid UTF-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(TransportError::handshake(
            None,
            format!("unexpected status line '{status_line}'"),
        ));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::handshake(None, format!("bad status line '{status_line}'")))?;

    let mut headers = Vec::new();
    for line in lines.take_while(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| TransportError::handshake(Some(status), format!("malformed header '{line}'")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(ResponseHead { status, headers })
}

/// What the peer answered to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// 101 with `Upgrade: websocket`.
    Upgraded,
    /// 3xx with a `Location` header.
    Redirect {
        /// Status code
        code: u16,
        /// Target location
        location: String,
    },
}

/// Classifies a parsed response head.
///
/// # Errors
/// Returns `Handshake` (with the status) for any other answer.
pub fn classify(head: &ResponseHead) -> Result<HandshakeOutcome> {
    match head.status {
        101 => {
            let upgrade = head.header("Upgrade").unwrap_or_default();
            if upgrade.eq_ignore_ascii_case("websocket") {
                Ok(HandshakeOutcome::Upgraded)
            } else {
                Err(TransportError::handshake(
                    Some(101),
                    format!("unexpected Upgrade header '{upgrade}'"),
                ))
            }
        }
        code if REDIRECT_CODES.contains(&code) => match head.header("Location") {
            Some(location) if !location.is_empty() => Ok(HandshakeOutcome::Redirect {
                code,
                location: location.to_string(),
            }),
            _ => Err(TransportError::handshake(Some(code), "redirect without Location")),
        },
        code => Err(TransportError::handshake(Some(code), "upgrade rejected")),
    }
}
