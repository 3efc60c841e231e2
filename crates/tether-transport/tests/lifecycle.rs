//! Lifecycle tests for transport chains.
//!
//! These tests drive whole chains through the public API and check that
//! session resources, chain teardown and list ownership interact without
//! leaks or double frees.

use std::sync::Arc;
use std::time::Duration;

use tether_transport::mock::{MockEvent, MockOp, MockProbe, MockTransport};
use tether_transport::{
    close_chain, destroy_chain, ConnectStatus, LinkState, Ownership, ResourceEntry, ResourceRegistry,
    TransportError, TransportHandle, TransportList, WsConfig, WsTransport,
};

const TIMEOUT: Duration = Duration::from_millis(200);
const UPGRADED: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";

fn mock(probe: &Arc<MockProbe>, label: &str, parent: Option<TransportHandle>) -> TransportHandle {
    TransportHandle::new(Box::new(MockTransport::new(label, Arc::clone(probe))), parent)
}

fn teardown_events(probe: &MockProbe) -> Vec<MockEvent> {
    probe
        .events()
        .into_iter()
        .filter(|e| matches!(e.op, MockOp::Destroy | MockOp::Drop))
        .collect()
}

#[derive(Default)]
struct Session {
    header: Option<Vec<u8>>,
    body: Option<Vec<u8>>,
    trailer: Option<Vec<u8>>,
}

fn session_registry() -> ResourceRegistry<Session, usize> {
    ResourceRegistry::new()
        .with(
            ResourceEntry::new("header", |s: &mut Session| &mut s.header)
                .with_init(|s: &mut Session, _: &usize| {
                    s.header = Some(vec![0; 16]);
                    Ok(())
                }),
        )
        .with(
            ResourceEntry::new("body", |s: &mut Session| &mut s.body).with_init(|s: &mut Session, size: &usize| {
                s.body = Some(tether_transport::resource::try_alloc_bytes("body", *size)?);
                Ok(())
            }),
        )
        .with(
            ResourceEntry::new("trailer", |s: &mut Session| &mut s.trailer)
                .with_init(|s: &mut Session, _: &usize| {
                    s.trailer = Some(vec![0; 4]);
                    Ok(())
                }),
        )
}

#[test]
fn test_cleanup_is_idempotent() {
    let mut registry = session_registry();
    let mut session = Session::default();

    registry.init(&mut session, &64).unwrap();
    assert_eq!(registry.live_count(), 3);

    for _ in 0..3 {
        registry.cleanup(&mut session);
        assert_eq!(registry.live_count(), 0);
        assert!(session.header.is_none() && session.body.is_none() && session.trailer.is_none());
    }
}

#[test]
fn test_partial_init_rolls_back() {
    let mut registry = session_registry();
    let mut session = Session::default();

    let err = registry.init(&mut session, &usize::MAX).unwrap_err();
    assert!(err.is_allocation_failure());
    assert_eq!(registry.live_count(), 0);
    assert!(session.header.is_none());
    assert!(session.body.is_none());
    assert!(session.trailer.is_none());

    // The registry stays usable after a failed init
    registry.init(&mut session, &64).unwrap();
    assert_eq!(registry.live_count(), 3);
    registry.cleanup(&mut session);
}

#[tokio::test]
async fn test_exclusive_child_and_none_parent_destroyed_once() {
    let probe = MockProbe::new();
    let parent = mock(&probe, "B", None);
    let child = mock(&probe, "A", Some(parent.clone()));

    let mut list = TransportList::new();
    list.add(child, "a").unwrap();
    list.add_ex(parent.clone(), "b", Ownership::None).unwrap();

    list.destroy().await.unwrap();

    assert_eq!(probe.count("A", MockOp::Destroy), 1);
    assert_eq!(probe.count("B", MockOp::Destroy), 1);
    assert!(parent.is_destroyed());
}

#[tokio::test]
async fn test_two_chains_share_a_root() {
    let probe = MockProbe::new();
    let root = mock(&probe, "root", None);
    let left = mock(&probe, "left", Some(root.clone()));
    let right = mock(&probe, "right", Some(root.clone()));
    drop(root);

    let mut list = TransportList::new();
    list.add(left, "left").unwrap();
    list.add(right, "right").unwrap();
    list.destroy().await.unwrap();

    assert_eq!(probe.count("left", MockOp::Destroy), 1);
    assert_eq!(probe.count("right", MockOp::Destroy), 1);
    assert_eq!(probe.count("root", MockOp::Destroy), 1);
    assert_eq!(probe.count("root", MockOp::Drop), 1);
}

#[tokio::test]
async fn test_reconnect_keeps_one_buffer() {
    let probe = MockProbe::new();
    let leaf = TransportHandle::new(
        Box::new(MockTransport::new("leaf", Arc::clone(&probe)).with_session_buffer(256)),
        None,
    );
    let ws = WsTransport::wrap(leaf.clone(), WsConfig::default());

    for _ in 0..100 {
        probe.script_read("leaf", UPGRADED);
        assert_eq!(ws.connect("example.com", 80, TIMEOUT).await.unwrap(), ConnectStatus::Connected);
        assert_eq!(probe.live_buffers(), 1);

        ws.close().await.unwrap();
        assert_eq!(probe.live_buffers(), 0);
    }

    assert_eq!(probe.peak_buffers(), 1);
    assert_eq!(probe.count("leaf", MockOp::Connect), 100);
    assert_eq!(probe.count("leaf", MockOp::Close), 100);

    destroy_chain(ws).await.unwrap();
    assert!(leaf.is_destroyed());
}

#[tokio::test]
async fn test_chain_destroy_order() {
    let probe = MockProbe::new();
    let c = mock(&probe, "C", None);
    let b = mock(&probe, "B", Some(c.clone()));
    let a = mock(&probe, "A", Some(b.clone()));

    destroy_chain(a).await.unwrap();

    assert_eq!(
        teardown_events(&probe),
        vec![
            MockEvent::new("A", MockOp::Destroy),
            MockEvent::new("A", MockOp::Drop),
            MockEvent::new("B", MockOp::Destroy),
            MockEvent::new("B", MockOp::Drop),
            MockEvent::new("C", MockOp::Destroy),
            MockEvent::new("C", MockOp::Drop),
        ]
    );

    // A second walk from a freed node touches nothing
    destroy_chain(b.clone()).await.unwrap();
    assert_eq!(probe.count("B", MockOp::Destroy), 1);
    assert!(matches!(b.destroy().await, Err(TransportError::Destroyed { .. })));
    assert_eq!(c.state(), LinkState::Freed);
}

#[tokio::test]
async fn test_none_entry_survives_list_destroy() {
    let probe = MockProbe::new();
    let owned = mock(&probe, "owned", None);

    let mut list = TransportList::new();
    list.add_ex(owned.clone(), "owned", Ownership::None).unwrap();
    list.destroy().await.unwrap();

    assert_eq!(probe.count("owned", MockOp::Destroy), 0);
    assert!(!owned.is_destroyed());
    assert_eq!(owned.scheme(), None);

    owned.connect("localhost", 1, TIMEOUT).await.unwrap();
    owned.close().await.unwrap();
    owned.destroy().await.unwrap();
    assert_eq!(probe.count("owned", MockOp::Destroy), 1);
}

#[tokio::test]
async fn test_leaf_none_wrapper_exclusive() {
    let probe = MockProbe::new();
    let l = mock(&probe, "L", None);
    let m = mock(&probe, "M", Some(l.clone()));

    let mut list = TransportList::new();
    list.add_ex(l.clone(), "l", Ownership::None).unwrap();
    list.add_ex(m, "m", Ownership::Exclusive).unwrap();
    assert_eq!(list.get("m").map(TransportHandle::kind), Some("mock"));

    list.destroy().await.unwrap();

    assert_eq!(probe.count("M", MockOp::Destroy), 1);
    assert_eq!(probe.count("L", MockOp::Destroy), 1);
    assert!(l.is_destroyed());
}

#[tokio::test]
async fn test_failed_destroy_still_frees_chain() {
    let probe = MockProbe::new();
    let b = mock(&probe, "B", None);
    let a = mock(&probe, "A", Some(b.clone()));
    probe.fail_next("A", MockOp::Destroy);

    let err = destroy_chain(a.clone()).await.unwrap_err();
    assert!(matches!(err, TransportError::Io { .. }));
    assert!(a.is_destroyed());
    assert!(b.is_destroyed());
    assert_eq!(b.last_error().map(|r| r.layer), Some("mock"));
}

#[tokio::test]
async fn test_close_chain_stops_at_first_failure() {
    let probe = MockProbe::new();
    let c = mock(&probe, "C", None);
    let b = mock(&probe, "B", Some(c.clone()));
    let a = mock(&probe, "A", Some(b.clone()));
    probe.fail_next("B", MockOp::Close);

    assert!(close_chain(&a).await.is_err());
    assert_eq!(probe.count("A", MockOp::Close), 1);
    assert_eq!(probe.count("B", MockOp::Close), 1);
    assert_eq!(probe.count("C", MockOp::Close), 0);

    destroy_chain(a).await.unwrap();
}
