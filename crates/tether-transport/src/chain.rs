// ============================================
// File: crates/tether-transport/src/chain.rs
// ============================================
//! # Chain Operations
//!
//! ## Creation Reason
//! Teardown has to reach every layer of a stack, from the application-facing
//! node down to the raw socket, even when some layers fail on the way.
//!
//! ## Main Functionality
//! - `chain_execute`: apply a `ChainOp` to a node and each ancestor
//! - `close_chain`: close every layer, stopping at the first failure
//! - `destroy_chain`: free every layer, continuing through failures
//!
//! ## Walk Order
//! ```text
//!   A ──parent──► B ──parent──► C
//!   │             │             │
//!   ① capture B   ③ capture C   ⑤ capture none
//!   ② destroy+free A  ④ destroy+free B  ⑥ destroy+free C
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Walks are iterative; chain depth is not bounded by the stack
//! - Already-freed nodes are skipped by `destroy_chain`, not reported
//!
//! ## Last Modified
//! v0.1.0 - Initial chain operations

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::handle::TransportHandle;

// ============================================
// ChainOp
// ============================================

/// An operation applied to every node of a chain.
#[async_trait]
pub trait ChainOp: Send + Sync {
    /// Operation name for logs.
    fn name(&self) -> &'static str;

    /// Applies the operation to one node.
    ///
    /// # Errors
    /// Whatever the node operation reports.
    async fn apply(&self, transport: &TransportHandle) -> Result<()>;
}

/// Closes each node.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseOp;

#[async_trait]
impl ChainOp for CloseOp {
    fn name(&self) -> &'static str {
        "close"
    }

    async fn apply(&self, transport: &TransportHandle) -> Result<()> {
        transport.close().await
    }
}

// ============================================
// Walks
// ============================================

/// Applies `op` to `transport` and then to each of its ancestors.
///
/// With `aggregate_errors == false` the walk stops at the first failure and
/// returns it; ancestors are left untouched. Otherwise every node is visited
/// and the last failure is returned.
///
/// # Errors
/// The first or last per-node error, depending on `aggregate_errors`.
pub async fn chain_execute(
    transport: &TransportHandle,
    op: &dyn ChainOp,
    aggregate_errors: bool,
) -> Result<()> {
    let mut last_error = None;
    let mut next = Some(transport.clone());

    while let Some(node) = next {
        next = node.parent();

        if let Err(e) = op.apply(&node).await {
            if !aggregate_errors {
                debug!(op = op.name(), transport = %node.id(), error = %e, "Chain walk stopped");
                return Err(e);
            }
            warn!(op = op.name(), transport = %node.id(), error = %e, "Chain step failed, continuing");
            last_error = Some(e);
        }
    }

    last_error.map_or(Ok(()), Err)
}

/// Closes `transport` and its ancestors, stopping at the first failure.
///
/// # Errors
/// The first close failure.
pub async fn close_chain(transport: &TransportHandle) -> Result<()> {
    chain_execute(transport, &CloseOp, false).await
}

/// Destroys `transport` and every ancestor.
///
/// Each node's parent is captured before the node is freed. Nodes that are
/// already freed are skipped and the walk carries on to their parent, so a
/// node reachable from several chains is destroyed exactly once.
///
/// # Errors
/// The last per-node destroy failure; the walk always completes.
pub async fn destroy_chain(transport: TransportHandle) -> Result<()> {
    let mut last_error = None;
    let mut next = Some(transport);

    while let Some(node) = next {
        let parent = node.parent();

        match node.free().await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(transport = %node.id(), error = %e, "Destroy failed, continuing with parent");
                last_error = Some(e);
            }
            None => debug!(transport = %node.id(), "Already destroyed, skipping"),
        }

        drop(node);
        next = parent;
    }

    last_error.map_or(Ok(()), Err)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;
    use crate::mock::{MockEvent, MockOp, MockProbe, MockTransport};

    fn chain(probe: &Arc<MockProbe>, labels: &[&str]) -> Vec<TransportHandle> {
        let mut parent: Option<TransportHandle> = None;
        let mut nodes = Vec::new();
        for label in labels.iter().rev() {
            let node = TransportHandle::new(Box::new(MockTransport::new(*label, Arc::clone(probe))), parent.take());
            parent = Some(node.clone());
            nodes.push(node);
        }
        nodes.reverse();
        nodes
    }

    #[tokio::test]
    async fn test_close_chain_visits_all() {
        let probe = MockProbe::new();
        let nodes = chain(&probe, &["a", "b", "c"]);

        close_chain(&nodes[0]).await.unwrap();

        let closes: Vec<_> = probe
            .events()
            .into_iter()
            .filter(|e| e.op == MockOp::Close)
            .map(|e| e.label)
            .collect();
        assert_eq!(closes, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_close_chain_stops_on_first_error() {
        let probe = MockProbe::new();
        let nodes = chain(&probe, &["a", "b", "c"]);
        probe.fail_next("b", MockOp::Close);

        assert!(close_chain(&nodes[0]).await.is_err());
        assert_eq!(probe.count("a", MockOp::Close), 1);
        assert_eq!(probe.count("b", MockOp::Close), 1);
        assert_eq!(probe.count("c", MockOp::Close), 0);
    }

    #[tokio::test]
    async fn test_aggregate_returns_last_error() {
        let probe = MockProbe::new();
        let nodes = chain(&probe, &["a", "b", "c"]);
        probe.fail_next("a", MockOp::Close);
        probe.fail_next("b", MockOp::Close);

        let err = chain_execute(&nodes[0], &CloseOp, true).await.unwrap_err();
        assert!(err.to_string().contains("'b'"));
        assert_eq!(probe.count("c", MockOp::Close), 1);
    }

    #[tokio::test]
    async fn test_destroy_chain_order() {
        let probe = MockProbe::new();
        let mut nodes = chain(&probe, &["a", "b", "c"]);
        let top = nodes.remove(0);
        drop(nodes);

        destroy_chain(top).await.unwrap();

        assert_eq!(
            probe.events(),
            vec![
                MockEvent::new("a", MockOp::Destroy),
                MockEvent::new("a", MockOp::Drop),
                MockEvent::new("b", MockOp::Destroy),
                MockEvent::new("b", MockOp::Drop),
                MockEvent::new("c", MockOp::Destroy),
                MockEvent::new("c", MockOp::Drop),
            ]
        );
    }

    #[tokio::test]
    async fn test_destroy_chain_continues_past_errors() {
        let probe = MockProbe::new();
        let nodes = chain(&probe, &["a", "b", "c"]);
        probe.fail_next("a", MockOp::Destroy);

        assert!(destroy_chain(nodes[0].clone()).await.is_err());
        assert!(nodes.iter().all(TransportHandle::is_destroyed));
        assert_eq!(probe.count("c", MockOp::Destroy), 1);
    }

    #[tokio::test]
    async fn test_destroy_chain_skips_freed_nodes() {
        let probe = MockProbe::new();
        let nodes = chain(&probe, &["a", "b", "c"]);

        nodes[1].destroy().await.unwrap();
        destroy_chain(nodes[0].clone()).await.unwrap();

        for label in ["a", "b", "c"] {
            assert_eq!(probe.count(label, MockOp::Destroy), 1);
        }
        assert!(matches!(
            nodes[2].read(&mut [0u8; 4], Duration::from_millis(10)).await,
            Err(TransportError::Destroyed { .. })
        ));
    }
}
