//! Store trait: the abstract interface for value persistence.
//!
//! This trait keeps the replication layer storage-agnostic. The in-memory
//! implementation lives in [`crate::memory`]; persistent backends plug in
//! behind the same interface.

use async_trait::async_trait;

use bloomcast_core::{Chain, FilterSummary, Range, Value};

use crate::error::Result;

/// The Store trait: async interface for value persistence and
/// filter-based reconciliation.
///
/// All methods are async so that backends performing blocking I/O can yield
/// instead of stalling message dispatch for unrelated peers.
///
/// # Design Notes
///
/// - **`bulk_insert` is the dedup primitive**: it returns exactly the
///   subsequence that was newly persisted. When several peers deliver
///   overlapping data concurrently, only the first insert of a value
///   reports it as new, which is what prevents duplicate broadcast storms.
/// - **Ordering**: `request` returns values in ascending lexicographic
///   order.
/// - **Filters**: `raw_filter` must describe the store's current value set
///   with no false negatives.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether the exact value is stored.
    async fn has(&self, value: &Value) -> Result<bool>;

    /// Values within the half-open range, ascending, truncated at `limit`.
    async fn request(&self, range: &Range, limit: Option<usize>) -> Result<Vec<Value>>;

    /// Insert a batch of values.
    ///
    /// Returns exactly the subsequence that was newly persisted; values
    /// already present are skipped and not reported.
    async fn bulk_insert(&self, values: &[Value]) -> Result<Vec<Value>>;

    /// The current membership-filter summary of the stored value set.
    async fn raw_filter(&self) -> Result<FilterSummary>;

    /// Values stored locally but likely absent from the remote set
    /// described by `remote`, optionally restricted to `range`/`limit`.
    ///
    /// "Likely" because the remote filter can report false positives; a
    /// value the remote is actually missing may occasionally be withheld
    /// until a later round with a different filter seed.
    async fn sync_diff(
        &self,
        remote: &FilterSummary,
        range: Option<&Range>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>>;

    /// Record an authorization chain observed for this feed.
    ///
    /// Chain-aware backends persist it; the default is a no-op.
    async fn add_chain(&self, _chain: &Chain) -> Result<()> {
        Ok(())
    }
}
