//! Test fixtures and helpers.
//!
//! Common setup code for node-level integration tests: in-memory nodes
//! wired over the memory transport, with short poll intervals so sync
//! completes quickly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bloomcast_core::{Chain, FeedKeypair, Value};
use bloomcast_node::{memory, MemoryTrust, Node, NodeConfig, PeerId, Trust};
use bloomcast_store::MemoryStore;

/// Poll interval used by test nodes.
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Turn string slices into values.
pub fn values(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::from(*s)).collect()
}

/// Install a fmt tracing subscriber honoring `RUST_LOG`. Safe to call
/// from every test; only the first call wins.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A node over an in-memory store and trust store.
pub struct NodeFixture {
    pub node: Arc<Node>,
    pub store: Arc<MemoryStore>,
    pub trust: Arc<MemoryTrust>,
}

impl NodeFixture {
    /// A full node sharing the given feed identity.
    pub fn full(keypair: &FeedKeypair) -> Self {
        Self::build(keypair, true, Chain::root())
    }

    /// A partial node sharing the given feed identity.
    pub fn partial(keypair: &FeedKeypair) -> Self {
        Self::build(keypair, false, Chain::root())
    }

    /// A full node starting with a delegation proof.
    pub fn full_with_chain(keypair: &FeedKeypair, chain: Chain) -> Self {
        Self::build(keypair, true, chain)
    }

    fn build(keypair: &FeedKeypair, full: bool, chain: Chain) -> Self {
        let store = Arc::new(MemoryStore::new());
        let trust = Arc::new(MemoryTrust::new());

        let mut config = NodeConfig::new(keypair.feed_key(), keypair.seed().to_vec())
            .with_chain(chain)
            .with_poll_interval(TEST_POLL_INTERVAL);
        if !full {
            config = config.partial();
        }

        let node = Node::new(
            config,
            store.clone(),
            Some(trust.clone() as Arc<dyn Trust>),
        );

        Self { node, store, trust }
    }
}

/// Connect two fixtures over an in-memory duplex.
///
/// Both handshakes run concurrently, as they would over a socket.
pub async fn connect(a: &NodeFixture, b: &NodeFixture) -> (PeerId, PeerId) {
    let (conn_a, conn_b) = memory::pair();
    let (id_a, id_b) = tokio::join!(
        a.node.add_peer(Box::new(conn_a)),
        b.node.add_peer(Box::new(conn_b)),
    );
    (id_a.expect("handshake a"), id_b.expect("handshake b"))
}

/// Poll an async predicate until it holds or `timeout` expires.
///
/// Returns whether the predicate became true. Keeps tests free of fixed
/// sleeps that either waste time or flake.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
