// ============================================
// File: crates/tether-probe/src/stack.rs
// ============================================
//! # Chain Assembly
//!
//! ## Creation Reason
//! Builds the transport chain for a target and registers its nodes in a
//! `TransportList` so one `destroy` tears everything down exactly once.
//!
//! ## Layout
//! ```text
//!   ws target                          tcp target
//!   ┌────────┬───────────────┐         ┌───────┬───────────┐
//!   │ "ws"   │ Exclusive     │ ─► ws   │ "tcp" │ Exclusive │ ─► tcp
//!   │ "_tcp" │ leaf_ownership│ ─► tcp  └───────┴───────────┘
//!   └────────┴───────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The leaf is registered under `_tcp` only to make it reachable by
//!   scheme; the framed layer's chain owns it
//!
//! ## Last Modified
//! v0.1.0 - Initial stack assembly

use tracing::debug;

use tether_common::Ownership;
use tether_transport::{TcpTransport, TransportHandle, TransportList, WsConfig, WsTransport};

use crate::config::ProbeConfig;
use crate::error::Result;
use crate::target::{Target, TargetScheme};

/// List key of the leaf under a framed layer.
pub const LEAF_SCHEME: &str = "_tcp";

/// An assembled chain and the list that owns it.
#[derive(Debug)]
pub struct ProbeStack {
    list: TransportList,
    top_scheme: &'static str,
}

impl ProbeStack {
    /// Builds a TCP (and, for `ws` targets, framed) chain from `config`.
    ///
    /// # Errors
    /// Returns config errors for a bad target; list registration errors.
    pub fn build(config: &ProbeConfig) -> Result<Self> {
        let target = config.target()?;
        let leaf = TransportHandle::new(Box::new(TcpTransport::new(config.tcp.clone())), None);
        Self::assemble(leaf, &target, config.ws_for_target()?, config.probe.leaf_ownership)
    }

    /// Wraps an existing leaf according to the target scheme and lists it.
    ///
    /// # Errors
    /// List registration errors.
    pub fn assemble(
        leaf: TransportHandle,
        target: &Target,
        ws: WsConfig,
        leaf_ownership: Ownership,
    ) -> Result<Self> {
        let mut list = TransportList::new();
        let top_scheme = target.scheme.as_str();

        match target.scheme {
            TargetScheme::Tcp => {
                list.add(leaf, top_scheme)?;
            }
            TargetScheme::Ws => {
                let top = WsTransport::wrap(leaf.clone(), ws);
                list.add_ex(leaf, LEAF_SCHEME, leaf_ownership)?;
                list.add(top, top_scheme)?;
            }
        }

        debug!(url = %target, entries = ?list, "Chain assembled");
        Ok(Self { list, top_scheme })
    }

    /// Returns the application-facing node.
    #[must_use]
    pub fn top(&self) -> Option<&TransportHandle> {
        self.list.get(self.top_scheme)
    }

    /// Returns the node listed under `scheme`.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<&TransportHandle> {
        self.list.get(scheme)
    }

    /// Returns the list key of the application-facing node.
    #[must_use]
    pub const fn top_scheme(&self) -> &'static str {
        self.top_scheme
    }

    /// Tears down every listed chain.
    ///
    /// # Errors
    /// The last teardown failure.
    pub async fn destroy(self) -> Result<()> {
        self.list.destroy().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tether_transport::mock::{MockOp, MockProbe, MockTransport};

    fn mock_leaf(probe: &Arc<MockProbe>) -> TransportHandle {
        TransportHandle::new(Box::new(MockTransport::new("leaf", Arc::clone(probe))), None)
    }

    #[tokio::test]
    async fn test_ws_stack_layout() {
        let probe = MockProbe::new();
        let target = Target::parse("ws://example.com/echo").unwrap();
        let stack = ProbeStack::assemble(mock_leaf(&probe), &target, WsConfig::default(), Ownership::None).unwrap();

        let top = stack.top().unwrap().clone();
        let leaf = stack.get(LEAF_SCHEME).unwrap().clone();
        assert_eq!(top.kind(), "ws");
        assert!(top.parent().unwrap().ptr_eq(&leaf));
        assert_eq!(leaf.ownership(), Ownership::None);
        assert_eq!(top.ownership(), Ownership::Exclusive);

        stack.destroy().await.unwrap();
        assert!(top.is_destroyed());
        assert!(leaf.is_destroyed());
        assert_eq!(probe.count("leaf", MockOp::Destroy), 1);
    }

    #[tokio::test]
    async fn test_exclusive_leaf_still_destroyed_once() {
        let probe = MockProbe::new();
        let target = Target::parse("ws://example.com/").unwrap();
        let stack =
            ProbeStack::assemble(mock_leaf(&probe), &target, WsConfig::default(), Ownership::Exclusive).unwrap();

        stack.destroy().await.unwrap();
        assert_eq!(probe.count("leaf", MockOp::Destroy), 1);
    }

    #[tokio::test]
    async fn test_tcp_stack_layout() {
        let probe = MockProbe::new();
        let target = Target::parse("tcp://localhost:7").unwrap();
        let stack = ProbeStack::assemble(mock_leaf(&probe), &target, WsConfig::default(), Ownership::None).unwrap();

        assert_eq!(stack.top_scheme(), "tcp");
        assert_eq!(stack.top().unwrap().kind(), "mock");
        assert!(stack.get(LEAF_SCHEME).is_none());

        stack.destroy().await.unwrap();
        assert_eq!(probe.count("leaf", MockOp::Destroy), 1);
    }

    #[tokio::test]
    async fn test_build_from_config() {
        let stack = ProbeStack::build(&ProbeConfig::default()).unwrap();
        assert_eq!(stack.top().unwrap().kind(), "ws");
        assert_eq!(stack.get(LEAF_SCHEME).unwrap().kind(), "tcp");
        stack.destroy().await.unwrap();
    }
}
