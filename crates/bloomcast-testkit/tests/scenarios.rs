//! Cross-node integration scenarios.
//!
//! Each test wires real nodes over the in-memory transport and drives the
//! full sync protocol: handshakes, filter polls, range requests, and
//! broadcast fan-out.

use std::time::Duration;

use bloomcast_core::{Chain, FeedKeypair, Link, Range, Value};
use bloomcast_node::{limits, verify_convergence, Watcher};
use bloomcast_testkit::{connect, init_tracing, values, wait_until, NodeFixture};

const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

fn feed() -> FeedKeypair {
    FeedKeypair::generate()
}

/// Collect watcher batches until the stream goes quiet.
async fn drain(watcher: &mut Watcher, quiet: Duration) -> Vec<Value> {
    let mut got = Vec::new();
    while let Ok(Some(batch)) = tokio::time::timeout(quiet, watcher.recv()).await {
        got.extend(batch);
    }
    got
}

/// Collect at least `count` values from a watcher, sorted, panicking on
/// timeout.
async fn collect_at_least(watcher: &mut Watcher, count: usize) -> Vec<Value> {
    let deadline = tokio::time::Instant::now() + SYNC_TIMEOUT;
    let mut got = Vec::new();
    while got.len() < count {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("watcher produced only {} of {count} values", got.len()));
        match tokio::time::timeout(remaining, watcher.recv()).await {
            Ok(Some(batch)) => got.extend(batch),
            Ok(None) => panic!("watcher closed after {} of {count} values", got.len()),
            Err(_) => panic!("watcher produced only {} of {count} values", got.len()),
        }
    }
    got.sort();
    got
}

#[tokio::test]
async fn full_nodes_converge_after_connection() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::full(&keypair);

    // Disjoint sets plus one shared value.
    a.node.bulk_insert(&values(&["hello", "world"])).await.unwrap();
    b.node.bulk_insert(&values(&["ohai", "world"])).await.unwrap();

    // Watch everything on A to observe exactly what gets delivered.
    let mut watcher = a.node.watch(Range::open("")).await.unwrap();
    let initial = watcher.recv().await.unwrap();
    assert_eq!(initial, values(&["hello", "world"]));

    connect(&a, &b).await;

    assert!(
        wait_until(SYNC_TIMEOUT, || async {
            a.node.has(&Value::from("ohai")).await.unwrap()
                && b.node.has(&Value::from("hello")).await.unwrap()
        })
        .await,
        "nodes never converged"
    );

    assert!(verify_convergence(&*a.store, &*b.store)
        .await
        .unwrap()
        .is_converged());

    // "world" was known on both sides; it must never be re-accepted, so
    // the watcher saw each value exactly once.
    let mut seen = initial;
    seen.extend(drain(&mut watcher, Duration::from_millis(100)).await);
    seen.sort();
    assert_eq!(seen, values(&["hello", "ohai", "world"]));
}

#[tokio::test]
async fn partial_node_watch_before_connecting() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::partial(&keypair);

    a.node
        .bulk_insert(&values(&["hello", "holy", "world"]))
        .await
        .unwrap();

    // Watch before any peer exists; the range is replayed on connect.
    let mut watcher = b.node.watch(Range::new("h", "i")).await.unwrap();

    connect(&a, &b).await;

    let got = collect_at_least(&mut watcher, 2).await;
    assert_eq!(got, values(&["hello", "holy"]));

    // Nothing outside the watched range reached the partial node.
    assert!(!b.node.has(&Value::from("world")).await.unwrap());
    assert!(drain(&mut watcher, Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn partial_node_watch_after_connecting() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::partial(&keypair);

    a.node
        .bulk_insert(&values(&["hello", "holy", "world"]))
        .await
        .unwrap();

    connect(&a, &b).await;

    // Watch with the peer already connected; the request goes out now.
    let mut watcher = b.node.watch(Range::new("h", "i")).await.unwrap();

    let got = collect_at_least(&mut watcher, 2).await;
    assert_eq!(got, values(&["hello", "holy"]));
}

#[tokio::test]
async fn watcher_range_fidelity_under_live_inserts() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::partial(&keypair);

    connect(&a, &b).await;
    let mut watcher = b.node.watch(Range::new("h", "i")).await.unwrap();

    // Live inserts on A get pushed to B; the watcher must filter.
    for batch in [
        values(&["alpha", "hello"]),
        values(&["world"]),
        values(&["holy", "zeta"]),
    ] {
        a.node.bulk_insert(&batch).await.unwrap();
    }

    let got = collect_at_least(&mut watcher, 2).await;
    assert_eq!(got, values(&["hello", "holy"]));
    assert!(drain(&mut watcher, Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn bulk_insert_is_idempotent() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);

    let batch = values(&["one", "two", "three"]);
    let first = a.node.bulk_insert(&batch).await.unwrap();
    assert_eq!(first.len(), 3);

    let second = a.node.bulk_insert(&batch).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(a.store.len(), 3);
}

#[tokio::test]
async fn larger_disjoint_sets_converge() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::full(&keypair);

    let set_a: Vec<Value> = (0..120)
        .map(|i| Value::from(format!("a-{i:03}").into_bytes()))
        .collect();
    let set_b: Vec<Value> = (0..120)
        .map(|i| Value::from(format!("b-{i:03}").into_bytes()))
        .collect();

    a.node.bulk_insert(&set_a).await.unwrap();
    b.node.bulk_insert(&set_b).await.unwrap();

    connect(&a, &b).await;

    assert!(
        wait_until(SYNC_TIMEOUT, || async {
            verify_convergence(&*a.store, &*b.store)
                .await
                .unwrap()
                .is_converged()
        })
        .await,
        "large sets never converged"
    );
    assert_eq!(a.store.len(), 240);
}

#[tokio::test]
async fn diff_wider_than_one_message_converges() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::full(&keypair);

    // More values than fit in a single Data message.
    let batch: Vec<Value> = (0..limits::MAX_VALUES_PER_MESSAGE + 100)
        .map(|i| Value::from(format!("v-{i:05}").into_bytes()))
        .collect();
    a.node.bulk_insert(&batch).await.unwrap();

    connect(&a, &b).await;

    assert!(
        wait_until(Duration::from_secs(10), || async {
            b.store.len() == batch.len()
        })
        .await,
        "oversized diff never fully transferred"
    );
    assert!(verify_convergence(&*a.store, &*b.store)
        .await
        .unwrap()
        .is_converged());
}

#[tokio::test]
async fn handshake_chains_reach_trust_stores() {
    init_tracing();
    let root = feed();
    let member = FeedKeypair::generate();
    let delegation = Chain::from_links(vec![Link::delegate(&root, member.feed_key(), 0)]);

    let a = NodeFixture::full_with_chain(&root, delegation);
    let b = NodeFixture::full(&root);
    let feed_key = root.feed_key();

    connect(&a, &b).await;

    // Each side records the chain the other presented during the
    // handshake.
    assert!(
        wait_until(SYNC_TIMEOUT, || async {
            b.trust.chain(&feed_key).map(|c| c.len()) == Some(1)
                && a.trust.chain(&feed_key).map(|c| c.len()) == Some(0)
        })
        .await,
        "handshake chains never recorded"
    );

    // Chain adoption only happens on explicit chain-update announcements,
    // so each node's own proof is untouched by the handshake.
    assert_eq!(a.node.chain().len(), 1);
    assert_eq!(b.node.chain().len(), 0);
}

#[tokio::test]
async fn closing_one_node_leaves_the_other_alive() {
    init_tracing();
    let keypair = feed();
    let a = NodeFixture::full(&keypair);
    let b = NodeFixture::full(&keypair);

    connect(&a, &b).await;
    a.node.insert("before").await.unwrap();

    assert!(
        wait_until(SYNC_TIMEOUT, || async {
            b.node.has(&Value::from("before")).await.unwrap()
        })
        .await
    );

    a.node.close().await;

    assert!(
        wait_until(SYNC_TIMEOUT, || async { b.node.peer_count() == 0 }).await,
        "peer teardown never propagated"
    );

    // B keeps serving local operations.
    assert!(b.node.insert("after").await.unwrap());
    assert!(b.node.has(&Value::from("after")).await.unwrap());
}
