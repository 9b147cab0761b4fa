//! Trust collaborator interface.
//!
//! The trust store records authorization chains observed per feed and owns
//! the actual authorization decisions. Replication only hands chains over;
//! it never judges them beyond preferring shorter proofs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use bloomcast_core::{Chain, FeedKey};

use crate::error::Result;

/// Sink for authorization chains observed during replication.
#[async_trait]
pub trait Trust: Send + Sync {
    /// Record a chain observed for `feed_key`.
    async fn add_chain(&self, feed_key: &FeedKey, chain: &Chain) -> Result<()>;
}

/// In-memory trust store keeping the shortest chain per feed. For tests.
#[derive(Default)]
pub struct MemoryTrust {
    chains: RwLock<HashMap<FeedKey, Chain>>,
}

impl MemoryTrust {
    /// Create an empty trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shortest chain recorded for a feed, if any.
    pub fn chain(&self, feed_key: &FeedKey) -> Option<Chain> {
        self.chains.read().unwrap().get(feed_key).cloned()
    }
}

#[async_trait]
impl Trust for MemoryTrust {
    async fn add_chain(&self, feed_key: &FeedKey, chain: &Chain) -> Result<()> {
        let mut chains = self.chains.write().unwrap();
        match chains.get(feed_key) {
            Some(current) if current.len() <= chain.len() => {}
            _ => {
                chains.insert(*feed_key, chain.clone());
            }
        }
        Ok(())
    }
}
