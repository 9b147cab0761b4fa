//! # Bloomcast Store
//!
//! Storage abstraction for Bloomcast. Provides a trait-based interface for
//! value persistence and membership-filter reconciliation, with an
//! in-memory reference implementation.
//!
//! ## Overview
//!
//! The store module abstracts value storage behind the [`Store`] trait,
//! keeping the replication layer storage-agnostic. [`MemoryStore`] is the
//! in-memory implementation used by tests and small deployments; persistent
//! backends implement the same trait.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`MemoryStore`] - In-memory bloom-backed storage
//! - [`Bloom`] - The membership filter behind [`MemoryStore`]
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: `bulk_insert` returns exactly the subsequence
//!   that was newly persisted; re-inserting a known value is a no-op.
//! - **No false negatives**: the filter may claim a value is present when
//!   it is not, never the reverse, so reconciliation can only *delay*
//!   convergence, not lose data.

pub mod bloom;
pub mod error;
pub mod memory;
pub mod traits;

pub use bloom::{summary_contains, Bloom};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::Store;
