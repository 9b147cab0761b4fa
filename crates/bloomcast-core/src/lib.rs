//! # Bloomcast Core
//!
//! Pure primitives for Bloomcast: values, ranges, authorization chains,
//! and membership-filter summaries.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over byte values and cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Value`] - The opaque, lexicographically ordered unit of replication
//! - [`Range`] - A half-open interval `[start, end)` over value ordering
//! - [`FeedKey`] - Public key identifying a feed
//! - [`Chain`] - Ordered delegation proof authorizing appends to a feed
//! - [`FilterSummary`] - Compact probabilistic digest of a value set

pub mod chain;
pub mod error;
pub mod filter;
pub mod keys;
pub mod value;

pub use chain::{Chain, Link};
pub use error::CoreError;
pub use filter::FilterSummary;
pub use keys::{FeedKey, FeedKeypair};
pub use value::{Range, Value};
