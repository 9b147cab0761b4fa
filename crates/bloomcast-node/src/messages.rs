//! Sync protocol message types.
//!
//! These messages are exchanged between peers once a secure channel exists.
//! Dispatch is an exhaustive match over this enum; frames that fail to
//! decode into it are dropped by the transport, not surfaced as errors.

use serde::{Deserialize, Serialize};

use bloomcast_core::{FilterSummary, Range, Value};

/// Message size limits.
pub mod limits {
    /// Max values carried by one Data message.
    pub const MAX_VALUES_PER_MESSAGE: usize = 4096;
    /// Max size of one value in bytes.
    pub const MAX_VALUE_BYTES: usize = 64 * 1024;
    /// Max filter payload in a Sync message.
    pub const MAX_FILTER_BYTES: usize = 1024 * 1024;
}

/// Sync protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// Reconciliation handshake: advertise the local filter summary.
    ///
    /// The receiver replies with Data for values it holds that are likely
    /// absent from the advertised set. `range`/`limit` scope the reply;
    /// the periodic full-mode poll sends neither.
    Sync {
        /// Digest of the sender's current value set.
        summary: FilterSummary,
        /// Optional restriction of the reply.
        range: Option<Range>,
        /// Optional cap on values in the reply.
        limit: Option<u64>,
    },

    /// Filter tuning negotiation. Reserved; currently a no-op placeholder.
    FilterOptions {
        /// Proposed filter size in bits.
        bits: Option<u64>,
        /// Proposed number of hash probes.
        hash_count: Option<u32>,
    },

    /// Value transfer, in either direction.
    Data {
        /// The values being sent.
        values: Vec<Value>,
    },

    /// Explicit pull of a value range (partial-mode fetch).
    Request {
        /// Inclusive lower bound.
        start: Value,
        /// Exclusive upper bound; absent = open-ended.
        end: Option<Value>,
        /// Optional cap on values in the reply.
        limit: Option<u64>,
    },
}

impl WireMessage {
    /// Check that this message respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            WireMessage::Sync { summary, .. } => {
                if summary.filter.len() > limits::MAX_FILTER_BYTES {
                    return Err("filter too large");
                }
            }
            WireMessage::Data { values } => {
                if values.len() > limits::MAX_VALUES_PER_MESSAGE {
                    return Err("too many values");
                }
                if values.iter().any(|v| v.len() > limits::MAX_VALUE_BYTES) {
                    return Err("value too large");
                }
            }
            WireMessage::FilterOptions { .. } | WireMessage::Request { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloomcast_core::FilterSummary;

    #[test]
    fn test_limits_valid() {
        let msg = WireMessage::Data {
            values: vec![Value::from("hello")],
        };
        assert!(msg.validate_limits().is_ok());

        let msg = WireMessage::Sync {
            summary: FilterSummary::empty(),
            range: None,
            limit: None,
        };
        assert!(msg.validate_limits().is_ok());
    }

    #[test]
    fn test_limits_exceeded() {
        let msg = WireMessage::Data {
            values: vec![Value::from("x"); limits::MAX_VALUES_PER_MESSAGE + 1],
        };
        assert!(msg.validate_limits().is_err());

        let msg = WireMessage::Data {
            values: vec![Value::from(vec![0u8; limits::MAX_VALUE_BYTES + 1])],
        };
        assert!(msg.validate_limits().is_err());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let msg = WireMessage::Request {
            start: Value::from("h"),
            end: Some(Value::from("i")),
            limit: Some(10),
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&msg, &mut buf).unwrap();
        let decoded: WireMessage = ciborium::from_reader(buf.as_slice()).unwrap();

        match decoded {
            WireMessage::Request { start, end, limit } => {
                assert_eq!(start, Value::from("h"));
                assert_eq!(end, Some(Value::from("i")));
                assert_eq!(limit, Some(10));
            }
            other => panic!("expected Request, got {:?}", other),
        }
    }
}
