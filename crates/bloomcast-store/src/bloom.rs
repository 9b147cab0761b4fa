//! The membership filter behind [`crate::MemoryStore`].
//!
//! A plain bloom filter probed with blake3. Each value sets `hash_count`
//! bits chosen by seeded hashes; lookups may report false positives but
//! never false negatives. The same probe sequence is applied to foreign
//! [`FilterSummary`] payloads via [`summary_contains`], which is what makes
//! two stores' filters comparable during reconciliation.

use bytes::Bytes;

use bloomcast_core::{FilterSummary, Value};

/// Target bits per stored value. ~10 bits with 4 probes gives a false
/// positive rate around 1%.
const BITS_PER_ITEM: u64 = 10;
const DEFAULT_HASH_COUNT: u32 = 4;
const MIN_BITS: u64 = 512;

/// A bloom membership filter over values.
#[derive(Debug, Clone)]
pub struct Bloom {
    bits: Vec<u8>,
    bit_count: u64,
    hash_count: u32,
    seed: u64,
}

impl Bloom {
    /// Create a filter sized for roughly `capacity` values.
    pub fn with_capacity(capacity: usize, seed: u64) -> Self {
        let bit_count = (capacity as u64 * BITS_PER_ITEM).max(MIN_BITS);
        let bit_count = (bit_count + 7) / 8 * 8;
        Self {
            bits: vec![0u8; (bit_count / 8) as usize],
            bit_count,
            hash_count: DEFAULT_HASH_COUNT,
            seed,
        }
    }

    /// Set the probe bits for a value.
    pub fn insert(&mut self, value: &Value) {
        for i in 0..self.hash_count {
            let bit = probe(self.seed, i, value) % self.bit_count;
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// Whether the value is probably present.
    pub fn contains(&self, value: &Value) -> bool {
        (0..self.hash_count).all(|i| {
            let bit = probe(self.seed, i, value) % self.bit_count;
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    /// Export the filter as a wire summary.
    pub fn summary(&self) -> FilterSummary {
        FilterSummary {
            filter: Bytes::copy_from_slice(&self.bits),
            bits: self.bit_count,
            hash_count: self.hash_count,
            seed: self.seed,
        }
    }
}

/// Probe a foreign filter summary for a value.
///
/// An empty summary matches nothing, so diffing against a fresh store
/// reports every local value as missing.
pub fn summary_contains(summary: &FilterSummary, value: &Value) -> bool {
    if summary.bits == 0 || summary.hash_count == 0 {
        return false;
    }
    (0..summary.hash_count).all(|i| {
        let bit = probe(summary.seed, i, value) % summary.bits;
        let byte = (bit / 8) as usize;
        match summary.filter.get(byte) {
            Some(b) => b & (1 << (bit % 8)) != 0,
            None => false,
        }
    })
}

fn probe(seed: u64, index: u32, value: &Value) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"bloomcast-probe-v0:");
    hasher.update(&seed.to_le_bytes());
    hasher.update(&index.to_le_bytes());
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest.as_bytes()[..8].try_into().expect("8 bytes"))
}
