//! Per-connection protocol adapter.
//!
//! A [`Peer`] drives the sync protocol over one secured channel against
//! the node's shared store. It answers `Sync` and `Request` messages,
//! ingests `Data`, and (in full mode) periodically advertises the local
//! filter summary. Values newly accepted from the remote are reported
//! upward through a [`PeerEvent`] channel; the node handles fan-out.
//!
//! Peers are constructible on their own, without a node, which is how the
//! protocol-level tests below exercise them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use bloomcast_core::{Chain, FeedKey, Range, Value};
use bloomcast_store::Store;

use crate::error::{NodeError, Result};
use crate::messages::{limits, WireMessage};
use crate::transport::{Channel, ChannelEvent};
use crate::trust::Trust;

/// Identifier of a live peer within one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub(crate) u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Events a peer reports to its owner.
#[derive(Debug)]
pub enum PeerEvent {
    /// The remote delivered values the store had not seen before.
    Accepted {
        /// The reporting peer.
        peer: PeerId,
        /// Exactly the newly persisted subsequence.
        values: Vec<Value>,
    },
    /// The remote announced a new authorization chain.
    ChainUpdate {
        /// The announced chain.
        chain: Chain,
    },
    /// The channel closed or failed; the peer is done.
    Closed {
        /// The reporting peer.
        peer: PeerId,
    },
}

/// Configuration for one peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// The feed being replicated.
    pub feed_key: FeedKey,
    /// Full mode: continuously reconcile the whole feed. Partial mode
    /// peers only answer and issue explicit requests.
    pub full: bool,
    /// Interval between filter advertisements in full mode.
    pub poll_interval: Duration,
}

/// One live connection, driving the sync protocol.
pub struct Peer {
    id: PeerId,
    channel: Arc<dyn Channel>,
    store: Arc<dyn Store>,
    trust: Option<Arc<dyn Trust>>,
    feed_key: FeedKey,
    closed: AtomicBool,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Peer {
    /// Spawn a peer over a secured channel.
    ///
    /// The peer starts in the connecting state and becomes active when the
    /// channel surfaces its `Secure` event; polling (full mode) begins
    /// then, with an immediate first advertisement.
    pub fn spawn(
        id: PeerId,
        channel: Box<dyn Channel>,
        store: Arc<dyn Store>,
        trust: Option<Arc<dyn Trust>>,
        config: PeerConfig,
        events: mpsc::Sender<PeerEvent>,
    ) -> Arc<Peer> {
        let peer = Arc::new(Peer {
            id,
            channel: Arc::from(channel),
            store,
            trust,
            feed_key: config.feed_key,
            closed: AtomicBool::new(false),
            tasks: StdMutex::new(Vec::new()),
        });

        let (active_tx, active_rx) = watch::channel(false);

        let mut tasks = vec![tokio::spawn(
            Arc::clone(&peer).read_loop(events, active_tx),
        )];
        if config.full {
            tasks.push(tokio::spawn(
                Arc::clone(&peer).poll_loop(config.poll_interval, active_rx),
            ));
        }
        *peer.tasks.lock().unwrap() = tasks;

        peer
    }

    /// This peer's id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Push values to the remote immediately, outside the poll cycle.
    ///
    /// Resolves once the transport accepted the send. The remote may well
    /// know some of the values already; its store deduplicates.
    pub async fn broadcast(&self, values: &[Value]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NodeError::PeerClosed);
        }
        self.send_data(values).await
    }

    /// Ask the remote for its values within a range.
    pub async fn request(&self, range: &Range, limit: Option<u64>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NodeError::PeerClosed);
        }
        self.channel
            .send(WireMessage::Request {
                start: range.start.clone(),
                end: range.end.clone(),
                limit,
            })
            .await
    }

    /// Send values as `Data`, split into messages the remote will accept.
    ///
    /// Receivers drop frames over [`limits::MAX_VALUES_PER_MESSAGE`], so an
    /// unchunked send of a large diff would be discarded whole and the same
    /// diff regenerated every poll round.
    async fn send_data(&self, values: &[Value]) -> Result<()> {
        for chunk in values.chunks(limits::MAX_VALUES_PER_MESSAGE) {
            self.channel
                .send(WireMessage::Data {
                    values: chunk.to_vec(),
                })
                .await?;
        }
        Ok(())
    }

    /// Tear the peer down: close the channel, stop all tasks. Idempotent;
    /// calling on an already-closed peer does nothing.
    pub async fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.channel.close().await;
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        events: mpsc::Sender<PeerEvent>,
        active: watch::Sender<bool>,
    ) {
        loop {
            match self.channel.recv().await {
                Ok(Some(event)) => {
                    if let Err(err) = self.dispatch(event, &events, &active).await {
                        // Fatal to this message only; the connection lives on.
                        warn!(peer = %self.id, error = %err, "message handling failed");
                    }
                }
                Ok(None) => {
                    debug!(peer = %self.id, "channel closed");
                    break;
                }
                Err(err) => {
                    warn!(peer = %self.id, error = %err, "channel error");
                    break;
                }
            }
        }
        let _ = events.send(PeerEvent::Closed { peer: self.id }).await;
    }

    async fn dispatch(
        &self,
        event: ChannelEvent,
        events: &mpsc::Sender<PeerEvent>,
        active: &watch::Sender<bool>,
    ) -> Result<()> {
        match event {
            ChannelEvent::Secure { chain } => {
                debug!(peer = %self.id, chain_len = chain.len(), "channel secured");
                self.store.add_chain(&chain).await?;
                if let Some(trust) = &self.trust {
                    trust.add_chain(&self.feed_key, &chain).await?;
                }
                let _ = active.send(true);
            }
            ChannelEvent::Message(message) => self.handle(message, events).await?,
            ChannelEvent::ChainUpdate { chain } => {
                let _ = events.send(PeerEvent::ChainUpdate { chain }).await;
            }
        }
        Ok(())
    }

    async fn handle(&self, message: WireMessage, events: &mpsc::Sender<PeerEvent>) -> Result<()> {
        match message {
            WireMessage::Sync {
                summary,
                range,
                limit,
            } => {
                let values = self
                    .store
                    .sync_diff(&summary, range.as_ref(), limit.map(|l| l as usize))
                    .await?;
                trace!(peer = %self.id, count = values.len(), "sync diff computed");
                if !values.is_empty() {
                    self.send_data(&values).await?;
                }
            }
            WireMessage::Data { values } => {
                let inserted = self.store.bulk_insert(&values).await?;
                trace!(
                    peer = %self.id,
                    received = values.len(),
                    accepted = inserted.len(),
                    "data ingested"
                );
                if !inserted.is_empty() {
                    let _ = events
                        .send(PeerEvent::Accepted {
                            peer: self.id,
                            values: inserted,
                        })
                        .await;
                }
            }
            WireMessage::Request { start, end, limit } => {
                let range = Range { start, end };
                let values = self
                    .store
                    .request(&range, limit.map(|l| l as usize))
                    .await?;
                if !values.is_empty() {
                    self.send_data(&values).await?;
                }
            }
            WireMessage::FilterOptions { .. } => {
                trace!(peer = %self.id, "filter-options not supported yet");
            }
        }
        Ok(())
    }

    /// Advertise the current local filter on every tick, unscoped: the
    /// periodic full-reconciliation handshake.
    ///
    /// A store failure is fatal only to that tick; the next tick retries.
    /// A send failure means the channel is going away, so the loop stops
    /// and leaves the teardown to the read loop.
    async fn poll_loop(self: Arc<Self>, interval: Duration, mut active: watch::Receiver<bool>) {
        if active.wait_for(|active| *active).await.is_err() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let summary = match self.store.raw_filter().await {
                Ok(summary) => summary,
                Err(err) => {
                    warn!(peer = %self.id, error = %err, "filter read failed");
                    continue;
                }
            };
            let sync = WireMessage::Sync {
                summary,
                range: None,
                limit: None,
            };
            if let Err(err) = self.channel.send(sync).await {
                trace!(peer = %self.id, error = %err, "poll stopped");
                break;
            }
        }
    }
}
