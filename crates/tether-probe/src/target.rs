// ============================================
// File: crates/tether-probe/src/target.rs
// ============================================
//! # Probe Target
//!
//! Parses `ws://host[:port][/path]` and `tcp://host:port`. Hosts may be
//! bracketed IPv6 literals (`ws://[::1]:8080/`).

use std::fmt;
use std::str::FromStr;

use crate::error::{ProbeError, Result};

/// Which chain the probe builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScheme {
    /// Plain TCP chain (one layer).
    Tcp,
    /// Framed layer over TCP.
    Ws,
}

impl TargetScheme {
    /// Returns the URL scheme, also used as the list key of the top layer.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Ws => "ws",
        }
    }

    const fn default_port(self) -> Option<u16> {
        match self {
            Self::Tcp => None,
            Self::Ws => Some(80),
        }
    }
}

/// A parsed probe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Chain type.
    pub scheme: TargetScheme,
    /// Host name or address, without brackets.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Request path (`ws` only, `/` otherwise).
    pub path: String,
}

impl Target {
    /// Parses a target URL.
    ///
    /// # Errors
    /// Returns `InvalidTarget` for an unsupported scheme, a missing host,
    /// a missing or malformed port.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| ProbeError::invalid_target(url, reason);

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "tcp" => TargetScheme::Tcp,
            "ws" => TargetScheme::Ws,
            "wss" => return Err(invalid("TLS targets are not supported")),
            _ => return Err(invalid("unsupported scheme")),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if scheme == TargetScheme::Tcp && path != "/" {
            return Err(invalid("tcp targets take no path"));
        }

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            let port = match tail {
                "" => None,
                _ => Some(tail.strip_prefix(':').ok_or_else(|| invalid("garbage after ']'"))?),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match port {
            Some(p) => p.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| invalid("bad port"))?,
            None => scheme.default_port().ok_or_else(|| invalid("port is required"))?,
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

impl FromStr for Target {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.scheme {
            TargetScheme::Tcp => write!(f, "tcp://{host}:{}", self.port),
            TargetScheme::Ws => write!(f, "ws://{host}:{}{}", self.port, self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ws() {
        let t = Target::parse("ws://example.com/chat?room=1").unwrap();
        assert_eq!(t.scheme, TargetScheme::Ws);
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 80);
        assert_eq!(t.path, "/chat?room=1");

        let t: Target = "WS://127.0.0.1:9001".parse().unwrap();
        assert_eq!(t.port, 9001);
        assert_eq!(t.path, "/");
    }

    #[test]
    fn test_parse_ipv6() {
        let t = Target::parse("ws://[::1]:8080/echo").unwrap();
        assert_eq!(t.host, "::1");
        assert_eq!(t.port, 8080);
        assert_eq!(t.to_string(), "ws://[::1]:8080/echo");
    }

    #[test]
    fn test_parse_tcp() {
        let t = Target::parse("tcp://localhost:7").unwrap();
        assert_eq!(t.scheme, TargetScheme::Tcp);
        assert_eq!(t.to_string(), "tcp://localhost:7");

        assert!(Target::parse("tcp://localhost").is_err());
        assert!(Target::parse("tcp://localhost:7/path").is_err());
    }

    #[test]
    fn test_parse_rejects() {
        for url in [
            "example.com:80",
            "http://example.com",
            "wss://example.com",
            "ws://:80/",
            "ws://host:0/",
            "ws://host:99999/",
            "ws://[::1/",
        ] {
            let err = Target::parse(url).unwrap_err();
            assert!(err.is_config_error(), "{url} should be rejected");
        }
    }
}
