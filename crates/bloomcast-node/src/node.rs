//! The Node: root orchestrator for feed replication.
//!
//! A node owns the shared store, the current authorization chain, the
//! optional trust collaborator, and the live peer and watcher sets. It
//! accepts connections, fans newly accepted values out to every other
//! peer and every matching watcher, and keeps the shortest authorization
//! chain observed for its feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use bloomcast_core::{Chain, FeedKey, Range, Value};
use bloomcast_store::Store;

use crate::error::{NodeError, Result};
use crate::peer::{Peer, PeerConfig, PeerEvent, PeerId};
use crate::transport::{Channel, Connector, HandshakeConfig};
use crate::trust::Trust;
use crate::watcher::{Watcher, WatcherId, WatcherSlot};

/// How often full-mode peers advertise their filter by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

const PEER_EVENT_BUFFER: usize = 64;

/// Configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The feed being replicated.
    pub feed_key: FeedKey,
    /// Secret key material proving write authority during handshakes.
    pub private_key: Bytes,
    /// Initial delegation proof; root keyholders use the empty chain.
    pub chain: Chain,
    /// Full mode continuously reconciles the whole feed; partial mode
    /// fetches only explicitly watched ranges.
    pub full: bool,
    /// Interval between filter advertisements in full mode.
    pub poll_interval: Duration,
}

impl NodeConfig {
    /// Configuration for a full node with default polling.
    pub fn new(feed_key: FeedKey, private_key: impl Into<Bytes>) -> Self {
        Self {
            feed_key,
            private_key: private_key.into(),
            chain: Chain::root(),
            full: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Switch to partial mode.
    pub fn partial(mut self) -> Self {
        self.full = false;
        self
    }

    /// Start with a delegation proof.
    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// The root orchestrator: one per process identity, alive for the whole
/// replication session.
pub struct Node {
    config: NodeConfig,
    store: Arc<dyn Store>,
    trust: Option<Arc<dyn Trust>>,
    /// Shortest chain observed for our feed key.
    chain: StdRwLock<Chain>,
    peers: StdMutex<HashMap<PeerId, Arc<Peer>>>,
    watchers: StdMutex<HashMap<WatcherId, WatcherSlot>>,
    next_peer: AtomicU64,
    next_watcher: AtomicU64,
    closed: AtomicBool,
}

impl Node {
    /// Create a node over a store and an optional trust collaborator.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn Store>,
        trust: Option<Arc<dyn Trust>>,
    ) -> Arc<Node> {
        let chain = config.chain.clone();
        Arc::new(Node {
            config,
            store,
            trust,
            chain: StdRwLock::new(chain),
            peers: StdMutex::new(HashMap::new()),
            watchers: StdMutex::new(HashMap::new()),
            next_peer: AtomicU64::new(0),
            next_watcher: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// The feed this node replicates.
    pub fn feed_key(&self) -> FeedKey {
        self.config.feed_key
    }

    /// Snapshot of the current (shortest observed) chain.
    pub fn chain(&self) -> Chain {
        self.chain.read().unwrap().clone()
    }

    /// Number of live peers.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Storage access
    // ─────────────────────────────────────────────────────────────────────

    /// Whether the exact value is stored locally.
    pub async fn has(&self, value: &Value) -> Result<bool> {
        Ok(self.store.has(value).await?)
    }

    /// Locally stored values within a range.
    pub async fn request(&self, range: &Range, limit: Option<usize>) -> Result<Vec<Value>> {
        Ok(self.store.request(range, limit).await?)
    }

    /// Insert one value. Returns true iff it was newly accepted.
    pub async fn insert(&self, value: impl Into<Value>) -> Result<bool> {
        Ok(!self.bulk_insert(&[value.into()]).await?.is_empty())
    }

    /// Insert a batch of values; the store alone decides novelty.
    ///
    /// Resolves after every broadcast delivery *attempt* for the newly
    /// accepted values has finished; per-peer failures are dropped
    /// silently. Returns exactly the newly accepted subsequence.
    pub async fn bulk_insert(&self, values: &[Value]) -> Result<Vec<Value>> {
        let inserted = self.store.bulk_insert(values).await?;
        if !inserted.is_empty() {
            self.fan_out(&inserted, None).await;
        }
        Ok(inserted)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Watchers
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribe to values within a range.
    ///
    /// Currently stored matching values are delivered as the first batch.
    /// In partial mode the range is also requested from every connected
    /// peer, so matching values get fetched proactively instead of waiting
    /// for a full sync that never comes.
    pub async fn watch(&self, range: Range) -> Result<Watcher> {
        let id = WatcherId(self.next_watcher.fetch_add(1, Ordering::SeqCst));
        let (slot, watcher) = WatcherSlot::new(id, range.clone());

        // Register before reading the snapshot: a value accepted while the
        // read is in flight lands in the slot's buffer instead of falling
        // between snapshot and registration. The slot dedupes the overlap
        // on activation.
        self.watchers.lock().unwrap().insert(id, slot.clone());

        let stored = match self.store.request(&range, None).await {
            Ok(stored) => stored,
            Err(err) => {
                self.watchers.lock().unwrap().remove(&id);
                return Err(err.into());
            }
        };
        slot.activate(stored);
        debug!(watcher = id.0, "watcher registered");

        if !self.config.full {
            for peer in self.peer_snapshot(None) {
                if let Err(err) = peer.request(&range, None).await {
                    trace!(peer = %peer.id(), error = %err, "watch request skipped");
                }
            }
        }

        Ok(watcher)
    }

    /// Remove a watcher; no further batches are delivered.
    pub fn unwatch(&self, watcher: &Watcher) {
        if self.watchers.lock().unwrap().remove(&watcher.id()).is_some() {
            debug!(watcher = watcher.id().0, "watcher removed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Peers
    // ─────────────────────────────────────────────────────────────────────

    /// Secure a raw transport with this node's feed credentials and attach
    /// the resulting channel.
    ///
    /// A failed handshake affects no other peer; the error is returned and
    /// logged, the node carries on.
    pub async fn add_peer(self: &Arc<Self>, connector: Box<dyn Connector>) -> Result<PeerId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NodeError::NodeClosed);
        }

        let handshake = HandshakeConfig {
            feed_key: self.config.feed_key,
            private_key: self.config.private_key.clone(),
            chain: self.chain(),
        };

        let channel = match connector.secure(handshake).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!(error = %err, "peer handshake failed");
                return Err(err);
            }
        };

        self.add_stream(channel).await
    }

    /// Attach an already-secured channel as a new peer.
    pub async fn add_stream(self: &Arc<Self>, channel: Box<dyn Channel>) -> Result<PeerId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NodeError::NodeClosed);
        }

        let id = PeerId(self.next_peer.fetch_add(1, Ordering::SeqCst));
        let (events_tx, events_rx) = mpsc::channel(PEER_EVENT_BUFFER);

        let peer = Peer::spawn(
            id,
            channel,
            Arc::clone(&self.store),
            self.trust.clone(),
            PeerConfig {
                feed_key: self.config.feed_key,
                full: self.config.full,
                poll_interval: self.config.poll_interval,
            },
            events_tx,
        );
        self.peers.lock().unwrap().insert(id, Arc::clone(&peer));
        debug!(peer = %id, "peer attached");

        let node = Arc::downgrade(self);
        tokio::spawn(Self::pump_events(node, events_rx));

        // Partial nodes replay their watched ranges so the new peer can
        // serve them right away.
        if !self.config.full {
            let ranges: Vec<Range> = self
                .watchers
                .lock()
                .unwrap()
                .values()
                .map(|slot| slot.range().clone())
                .collect();
            for range in ranges {
                if let Err(err) = peer.request(&range, None).await {
                    trace!(peer = %id, error = %err, "watch replay skipped");
                }
            }
        }

        Ok(id)
    }

    /// Tear down every peer. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let peers: Vec<Arc<Peer>> = self
            .peers
            .lock()
            .unwrap()
            .drain()
            .map(|(_, peer)| peer)
            .collect();
        for peer in peers {
            peer.destroy().await;
        }
        debug!("node closed");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    async fn pump_events(node: std::sync::Weak<Node>, mut events: mpsc::Receiver<PeerEvent>) {
        while let Some(event) = events.recv().await {
            let Some(node) = node.upgrade() else { break };
            match event {
                PeerEvent::Accepted { peer, values } => {
                    node.fan_out(&values, Some(peer)).await;
                }
                PeerEvent::ChainUpdate { chain } => {
                    node.on_chain_update(chain).await;
                }
                PeerEvent::Closed { peer } => {
                    node.remove_peer(peer).await;
                    break;
                }
            }
        }
    }

    /// Forward values to every peer except the one they came from, then
    /// to every watcher. Watchers always receive everything regardless of
    /// origin; range filtering happens inside the slot.
    async fn fan_out(&self, values: &[Value], origin: Option<PeerId>) {
        for peer in self.peer_snapshot(origin) {
            // Best effort: a peer closing mid-flight is dropped silently.
            if let Err(err) = peer.broadcast(values).await {
                trace!(peer = %peer.id(), error = %err, "broadcast skipped");
            }
        }

        let slots: Vec<WatcherSlot> = self.watchers.lock().unwrap().values().cloned().collect();
        for slot in slots {
            slot.push(values);
        }
    }

    /// Adopt a remote chain iff strictly shorter than the current one.
    ///
    /// Pure proof-size minimization so future handshakes carry less; the
    /// trust collaborator owns actual authorization judgment and receives
    /// every observed chain either way.
    async fn on_chain_update(&self, chain: Chain) {
        {
            let mut current = self.chain.write().unwrap();
            if chain.len() < current.len() {
                debug!(
                    from = current.len(),
                    to = chain.len(),
                    "adopting shorter chain"
                );
                *current = chain.clone();
            }
        }
        if let Some(trust) = &self.trust {
            if let Err(err) = trust.add_chain(&self.config.feed_key, &chain).await {
                warn!(error = %err, "trust store rejected chain");
            }
        }
    }

    async fn remove_peer(&self, id: PeerId) {
        let peer = self.peers.lock().unwrap().remove(&id);
        if let Some(peer) = peer {
            peer.destroy().await;
            debug!(peer = %id, "peer removed");
        }
    }

    fn peer_snapshot(&self, skip: Option<PeerId>) -> Vec<Arc<Peer>> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| Some(**id) != skip)
            .map(|(_, peer)| Arc::clone(peer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::WireMessage;
    use crate::transport::memory::{secure_pair, MemoryChannel};
    use crate::transport::ChannelEvent;
    use crate::trust::MemoryTrust;
    use async_trait::async_trait;
    use bloomcast_core::{FeedKeypair, FilterSummary, Link};
    use bloomcast_store::{MemoryStore, Result as StoreResult};

    fn test_config(keypair: &FeedKeypair) -> NodeConfig {
        NodeConfig::new(keypair.feed_key(), keypair.seed().to_vec())
            .with_poll_interval(Duration::from_millis(10))
    }

    fn make_node(config: NodeConfig) -> (Arc<Node>, Arc<MemoryTrust>) {
        let trust = Arc::new(MemoryTrust::new());
        let node = Node::new(
            config,
            Arc::new(MemoryStore::with_seed(11)),
            Some(trust.clone() as Arc<dyn Trust>),
        );
        (node, trust)
    }

    /// Attach a raw far end to the node, keeping the far channel for the
    /// test to script.
    async fn attach_remote(node: &Arc<Node>, keypair: &FeedKeypair) -> (PeerId, MemoryChannel) {
        let config = HandshakeConfig {
            feed_key: keypair.feed_key(),
            private_key: Bytes::copy_from_slice(&keypair.seed()),
            chain: Chain::root(),
        };
        let (near, far) = secure_pair(config.clone(), config).await.unwrap();
        let id = node.add_stream(Box::new(near)).await.unwrap();
        (id, far)
    }

    /// Read frames from a scripted remote until a Data message shows up,
    /// or give up after `wait`.
    async fn next_data(channel: &MemoryChannel, wait: Duration) -> Option<Vec<Value>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let recv = channel.recv();
            match tokio::time::timeout_at(deadline, recv).await {
                Ok(Ok(Some(ChannelEvent::Message(WireMessage::Data { values })))) => {
                    return Some(values)
                }
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) | Ok(Err(_)) | Err(_) => return None,
            }
        }
    }

    #[tokio::test]
    async fn test_watch_delivers_stored_values_first() {
        let keypair = FeedKeypair::from_seed(&[1; 32]);
        let (node, _) = make_node(test_config(&keypair));

        node.bulk_insert(&[Value::from("hello"), Value::from("world")])
            .await
            .unwrap();

        let mut watcher = node.watch(Range::new("h", "i")).await.unwrap();
        assert_eq!(watcher.recv().await.unwrap(), vec![Value::from("hello")]);
    }

    #[tokio::test]
    async fn test_insert_fans_out_to_watchers() {
        let keypair = FeedKeypair::from_seed(&[1; 32]);
        let (node, _) = make_node(test_config(&keypair));

        let mut watcher = node.watch(Range::new("h", "i")).await.unwrap();

        assert!(node.insert("hello").await.unwrap());
        assert!(node.insert("world").await.unwrap());
        // Duplicate: accepted nowhere, delivered nowhere.
        assert!(!node.insert("hello").await.unwrap());

        assert_eq!(watcher.recv().await.unwrap(), vec![Value::from("hello")]);

        node.unwatch(&watcher);
        assert!(watcher.recv().await.is_none());
    }

    /// Store whose snapshot reads take long enough to race an insert.
    struct SlowSnapshotStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl Store for SlowSnapshotStore {
        async fn has(&self, value: &Value) -> StoreResult<bool> {
            self.inner.has(value).await
        }

        async fn request(&self, range: &Range, limit: Option<usize>) -> StoreResult<Vec<Value>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.request(range, limit).await
        }

        async fn bulk_insert(&self, values: &[Value]) -> StoreResult<Vec<Value>> {
            self.inner.bulk_insert(values).await
        }

        async fn raw_filter(&self) -> StoreResult<FilterSummary> {
            self.inner.raw_filter().await
        }

        async fn sync_diff(
            &self,
            remote: &FilterSummary,
            range: Option<&Range>,
            limit: Option<usize>,
        ) -> StoreResult<Vec<Value>> {
            self.inner.sync_diff(remote, range, limit).await
        }
    }

    #[tokio::test]
    async fn test_watch_racing_insert_delivers_exactly_once() {
        let keypair = FeedKeypair::from_seed(&[1; 32]);
        let store = Arc::new(SlowSnapshotStore {
            inner: MemoryStore::with_seed(5),
        });
        let node = Node::new(test_config(&keypair), store, None);

        // Start the watch, then insert while its snapshot read is still
        // in flight.
        let watch_node = Arc::clone(&node);
        let watch = tokio::spawn(async move { watch_node.watch(Range::open("")).await.unwrap() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(node.insert("hello").await.unwrap());

        let mut watcher = watch.await.unwrap();
        assert_eq!(watcher.recv().await.unwrap(), vec![Value::from("hello")]);

        // Exactly once: no duplicate batch is queued behind the first.
        node.unwatch(&watcher);
        assert!(watcher.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_accepted_values_skip_origin_peer() {
        let keypair = FeedKeypair::from_seed(&[1; 32]);
        let (node, _) = make_node(test_config(&keypair));

        let (_id_a, remote_a) = attach_remote(&node, &keypair).await;
        let (_id_b, remote_b) = attach_remote(&node, &keypair).await;

        remote_a
            .send(WireMessage::Data {
                values: vec![Value::from("x")],
            })
            .await
            .unwrap();

        // The other peer gets the value pushed.
        let forwarded = next_data(&remote_b, Duration::from_millis(500)).await;
        assert_eq!(forwarded.unwrap(), vec![Value::from("x")]);

        // The origin peer never sees its own value come back.
        let echoed = next_data(&remote_a, Duration::from_millis(100)).await;
        assert!(echoed.is_none(), "value echoed to origin: {:?}", echoed);
    }

    #[tokio::test]
    async fn test_chain_update_adopts_only_shorter() {
        let root = FeedKeypair::from_seed(&[1; 32]);
        let member = FeedKeypair::from_seed(&[2; 32]);

        let two = Chain::from_links(vec![
            Link::delegate(&root, member.feed_key(), 0),
            Link::delegate(&member, root.feed_key(), 0),
        ]);
        let one = Chain::from_links(vec![Link::delegate(&root, member.feed_key(), 0)]);

        let (node, trust) = make_node(test_config(&root).with_chain(two.clone()));
        assert_eq!(node.chain().len(), 2);

        node.on_chain_update(one.clone()).await;
        assert_eq!(node.chain().len(), 1);

        // Same length or longer: ignored.
        node.on_chain_update(two).await;
        assert_eq!(node.chain().len(), 1);

        // Trust saw every observed chain, keeping its own shortest.
        assert_eq!(trust.chain(&root.feed_key()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chain_update_from_remote_channel() {
        let root = FeedKeypair::from_seed(&[1; 32]);
        let member = FeedKeypair::from_seed(&[2; 32]);
        let one = Chain::from_links(vec![Link::delegate(&root, member.feed_key(), 0)]);

        let (node, _) = make_node(test_config(&root).with_chain(one));
        let (_id, remote) = attach_remote(&node, &root).await;

        remote.announce_chain(&Chain::root()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while node.chain().len() != 0 {
            assert!(tokio::time::Instant::now() < deadline, "chain never adopted");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_peer_teardown_on_remote_close() {
        let keypair = FeedKeypair::from_seed(&[1; 32]);
        let (node, _) = make_node(test_config(&keypair));

        let (_id, remote) = attach_remote(&node, &keypair).await;
        assert_eq!(node.peer_count(), 1);

        remote.close().await;

        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while node.peer_count() != 0 {
            assert!(tokio::time::Instant::now() < deadline, "peer never removed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_close_idempotent() {
        let keypair = FeedKeypair::from_seed(&[1; 32]);
        let (node, _) = make_node(test_config(&keypair));
        let (_id, _remote) = attach_remote(&node, &keypair).await;

        node.close().await;
        node.close().await;
        assert_eq!(node.peer_count(), 0);

        let (conn, _other) = crate::transport::memory::pair();
        assert!(matches!(
            node.add_peer(Box::new(conn)).await,
            Err(NodeError::NodeClosed)
        ));
    }
}
