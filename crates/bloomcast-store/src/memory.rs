//! In-memory implementation of the Store trait.
//!
//! Suitable for tests and small feeds. Same semantics a persistent backend
//! must provide, with everything held in a `BTreeSet`.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::Rng;

use bloomcast_core::{Chain, FilterSummary, Range, Value};

use crate::bloom::{summary_contains, Bloom};
use crate::error::Result;
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// The value set, kept in lexicographic order.
    values: BTreeSet<Value>,
    /// Base probe seed; each exported summary mixes in `generation`.
    seed: u64,
    /// Bumped per exported summary. Rotating the probe seed means a value
    /// falsely matched by one summary gets retried against the next, so
    /// false positives delay reconciliation but can never stall it.
    generation: u64,
    /// Shortest authorization chain observed for the feed, if any.
    chain: Option<Chain>,
}

impl MemoryStore {
    /// Create a new empty in-memory store with a random filter seed.
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().gen())
    }

    /// Create with a fixed filter seed, for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                values: BTreeSet::new(),
                seed,
                generation: 0,
                chain: None,
            }),
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().values.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shortest chain recorded via `add_chain`, if any.
    pub fn chain(&self) -> Option<Chain> {
        self.inner.read().unwrap().chain.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn in_range<'a>(&'a self, range: &'a Range) -> impl Iterator<Item = &'a Value> {
        let end = match &range.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        self.values
            .range((Bound::Included(range.start.clone()), end))
    }

}

#[async_trait]
impl Store for MemoryStore {
    async fn has(&self, value: &Value) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.values.contains(value))
    }

    async fn request(&self, range: &Range, limit: Option<usize>) -> Result<Vec<Value>> {
        let inner = self.inner.read().unwrap();
        let iter = inner.in_range(range).cloned();
        Ok(match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    async fn bulk_insert(&self, values: &[Value]) -> Result<Vec<Value>> {
        let mut inner = self.inner.write().unwrap();

        let mut inserted = Vec::new();
        for value in values {
            if inner.values.insert(value.clone()) {
                inserted.push(value.clone());
            }
        }
        Ok(inserted)
    }

    async fn raw_filter(&self) -> Result<FilterSummary> {
        let mut inner = self.inner.write().unwrap();
        let seed = inner.seed.wrapping_add(inner.generation);
        inner.generation = inner.generation.wrapping_add(1);

        let mut filter = Bloom::with_capacity(inner.values.len(), seed);
        for value in &inner.values {
            filter.insert(value);
        }
        Ok(filter.summary())
    }

    async fn sync_diff(
        &self,
        remote: &FilterSummary,
        range: Option<&Range>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let inner = self.inner.read().unwrap();

        let missing = |v: &&Value| !summary_contains(remote, v);
        let mut diff: Vec<Value> = match range {
            Some(range) => inner.in_range(range).filter(missing).cloned().collect(),
            None => inner.values.iter().filter(missing).cloned().collect(),
        };

        if let Some(limit) = limit {
            diff.truncate(limit);
        }
        Ok(diff)
    }

    async fn add_chain(&self, chain: &Chain) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let shorter = match &inner.chain {
            Some(current) => chain.len() < current.len(),
            None => true,
        };
        if shorter {
            inner.chain = Some(chain.clone());
        }
        Ok(())
    }
}
