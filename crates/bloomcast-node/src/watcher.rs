//! Range-scoped subscriptions.
//!
//! A watcher delivers every accepted value whose ordering key falls inside
//! its range, regardless of which peer (or local insert) produced it.
//! Delivery is always deferred: `push` only queues a batch, the subscriber
//! observes it on its next `recv().await`. That keeps producers from
//! re-entering subscriber code in the same dispatch turn.
//!
//! Watchers have no expiry. A watcher stays registered until `unwatch`,
//! so accumulating them unboundedly is the caller's problem.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;

use bloomcast_core::{Range, Value};

/// Identifier of a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub(crate) u64);

/// The subscriber half of a range subscription.
///
/// Created by `Node::watch`; dropped or passed to `Node::unwatch` when no
/// longer wanted.
pub struct Watcher {
    id: WatcherId,
    range: Range,
    rx: mpsc::UnboundedReceiver<Vec<Value>>,
}

impl Watcher {
    /// This watcher's registration id.
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// The subscribed range.
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// Await the next batch of matching values.
    ///
    /// Returns `None` once the watcher has been unregistered and all
    /// queued batches were drained.
    pub async fn recv(&mut self) -> Option<Vec<Value>> {
        self.rx.recv().await
    }
}

/// The node-side half: filters and queues batches for one watcher.
///
/// A fresh slot buffers pushes until [`WatcherSlot::activate`] delivers the
/// initial snapshot. That lets the node register the slot *before* reading
/// the snapshot: a value accepted while the read is in flight lands in the
/// buffer instead of falling between snapshot and registration, and the
/// overlap with the snapshot is dropped on activation so it is delivered
/// exactly once.
#[derive(Clone)]
pub(crate) struct WatcherSlot {
    range: Range,
    tx: mpsc::UnboundedSender<Vec<Value>>,
    /// `Some` while buffering; `None` once activated.
    pending: Arc<StdMutex<Option<Vec<Value>>>>,
}

impl WatcherSlot {
    pub(crate) fn new(id: WatcherId, range: Range) -> (WatcherSlot, Watcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            WatcherSlot {
                range: range.clone(),
                tx,
                pending: Arc::new(StdMutex::new(Some(Vec::new()))),
            },
            Watcher { id, range, rx },
        )
    }

    pub(crate) fn range(&self) -> &Range {
        &self.range
    }

    /// Queue the subset of `values` inside the range; empty batches are
    /// not delivered. A closed subscriber is ignored.
    pub(crate) fn push(&self, values: &[Value]) {
        let matched: Vec<Value> = values
            .iter()
            .filter(|v| self.range.contains(v))
            .cloned()
            .collect();
        if matched.is_empty() {
            return;
        }
        let mut pending = self.pending.lock().unwrap();
        match pending.as_mut() {
            Some(buffered) => buffered.extend(matched),
            None => {
                let _ = self.tx.send(matched);
            }
        }
    }

    /// Deliver the initial snapshot, then flush batches buffered while it
    /// was being read, dropping values the snapshot already covers. The
    /// snapshot must be in ascending store order.
    pub(crate) fn activate(&self, snapshot: Vec<Value>) {
        let mut pending = self.pending.lock().unwrap();
        let buffered = pending.take().unwrap_or_default();

        if !snapshot.is_empty() {
            let _ = self.tx.send(snapshot.clone());
        }
        let late: Vec<Value> = buffered
            .into_iter()
            .filter(|v| snapshot.binary_search(v).is_err())
            .collect();
        if !late.is_empty() {
            let _ = self.tx.send(late);
        }
    }
}
