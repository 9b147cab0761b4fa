//! Membership-filter summaries.
//!
//! A [`FilterSummary`] is the compact probabilistic digest a store exposes
//! for the sync handshake. The filter *data structure* lives with the
//! storage collaborator; this is only its serialized shape on the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A compact probabilistic membership digest of a value set.
///
/// Sent in `Sync` messages so the remote store can compute which of its
/// values are likely missing locally. May produce false positives (a value
/// reported present that is not), never false negatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    /// The raw filter bit array.
    pub filter: Bytes,
    /// Number of bits in the filter.
    pub bits: u64,
    /// Number of hash probes per value.
    pub hash_count: u32,
    /// Seed mixed into every probe hash.
    pub seed: u64,
}

impl FilterSummary {
    /// A summary matching nothing (the empty store).
    pub fn empty() -> Self {
        Self {
            filter: Bytes::new(),
            bits: 0,
            hash_count: 0,
            seed: 0,
        }
    }

    /// Whether the summary describes an empty value set.
    pub fn is_empty(&self) -> bool {
        self.filter.iter().all(|b| *b == 0)
    }
}
