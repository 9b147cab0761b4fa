//! Convergence verification.
//!
//! After syncing, two stores can be checked for convergence by comparing
//! deterministic digests of their full value sets. Mostly useful in tests
//! and diagnostics; the protocol itself never needs it.

use bloomcast_core::{Range, Value};
use bloomcast_store::Store;

use crate::error::Result;

/// Compute a deterministic digest of a store's entire value set.
///
/// Values are hashed in lexicographic order, length-prefixed, under a
/// domain separator. Two stores hold the same set iff their digests match.
pub async fn state_digest<S: Store + ?Sized>(store: &S) -> Result<blake3::Hash> {
    let values = store.request(&Range::all(), None).await?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"bloomcast-state-v0:");
    for value in values {
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    Ok(hasher.finalize())
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both stores hold identical value sets.
    Converged,
    /// The sets differ.
    Diverged {
        /// Values only the right store holds.
        missing_left: Vec<Value>,
        /// Values only the left store holds.
        missing_right: Vec<Value>,
    },
}

impl ConvergenceResult {
    /// Check if the stores have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Verify two stores hold the same value set.
pub async fn verify_convergence<L, R>(left: &L, right: &R) -> Result<ConvergenceResult>
where
    L: Store + ?Sized,
    R: Store + ?Sized,
{
    if state_digest(left).await? == state_digest(right).await? {
        return Ok(ConvergenceResult::Converged);
    }

    let left_values = left.request(&Range::all(), None).await?;
    let right_values = right.request(&Range::all(), None).await?;

    let missing_left = right_values
        .iter()
        .filter(|v| !left_values.contains(v))
        .cloned()
        .collect();
    let missing_right = left_values
        .iter()
        .filter(|v| !right_values.contains(v))
        .cloned()
        .collect();

    Ok(ConvergenceResult::Diverged {
        missing_left,
        missing_right,
    })
}
