//! Values and ranges.
//!
//! A [`Value`] is the opaque unit of replication: a byte sequence totally
//! ordered by lexicographic comparison. A [`Range`] is a half-open interval
//! `[start, end)` over that ordering, with an optional (open-ended) end.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque byte value, ordered lexicographically.
///
/// Cheap to clone: backed by [`Bytes`]. Deduplication is the store's job;
/// two values with identical bytes are the same value.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Value(Bytes);

impl Value {
    /// Create a value from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// View the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the value is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Value({:?})", s),
            Err(_) => write!(f, "Value(0x{})", hex::encode(&self.0)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(v))
    }
}

impl AsRef<[u8]> for Value {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A half-open interval `[start, end)` over value ordering.
///
/// `end: None` means open-ended: every value `>= start` matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive lower bound.
    pub start: Value,
    /// Exclusive upper bound; `None` = unbounded.
    pub end: Option<Value>,
}

impl Range {
    /// Create a bounded range `[start, end)`.
    pub fn new(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Self {
            start: start.into(),
            end: Some(end.into()),
        }
    }

    /// Create an open-ended range `[start, ..)`.
    pub fn open(start: impl Into<Value>) -> Self {
        Self {
            start: start.into(),
            end: None,
        }
    }

    /// The range covering every value.
    pub fn all() -> Self {
        Self {
            start: Value::new(Bytes::new()),
            end: None,
        }
    }

    /// Whether `value` falls inside the range.
    pub fn contains(&self, value: &Value) -> bool {
        if *value < self.start {
            return false;
        }
        match &self.end {
            Some(end) => value < end,
            None => true,
        }
    }
}
