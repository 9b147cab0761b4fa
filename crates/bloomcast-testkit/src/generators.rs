//! Proptest generators for property-based testing.

use proptest::prelude::*;

use bloomcast_core::{FeedKey, FeedKeypair, Range, Value};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = FeedKeypair> {
    any::<[u8; 32]>().prop_map(|seed| FeedKeypair::from_seed(&seed))
}

/// Generate a random feed key.
pub fn feed_key() -> impl Strategy<Value = FeedKey> {
    keypair().prop_map(|kp| kp.feed_key())
}

/// Generate a value of up to `max_len` bytes.
pub fn value(max_len: usize) -> impl Strategy<Value = Value> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Value::from)
}

/// Generate a batch of distinct values.
pub fn value_set(max_len: usize, max_count: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_set(
        prop::collection::vec(any::<u8>(), 0..=max_len),
        0..=max_count,
    )
    .prop_map(|set| set.into_iter().map(Value::from).collect())
}

/// Generate a range, possibly open-ended.
pub fn range(max_len: usize) -> impl Strategy<Value = Range> {
    (
        prop::collection::vec(any::<u8>(), 0..=max_len),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..=max_len)),
    )
        .prop_map(|(start, end)| Range {
            start: Value::from(start),
            end: end.map(Value::from),
        })
}
