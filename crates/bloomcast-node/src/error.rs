//! Error types for the node crate.

use thiserror::Error;

use bloomcast_core::FeedKey;

/// Errors that can occur while orchestrating replication.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Transport-level failure (channel broken, send failed).
    #[error("transport error: {0}")]
    Transport(String),

    /// The authenticated handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The remote end speaks for a different feed.
    #[error("feed key mismatch: local={local}, remote={remote}")]
    FeedKeyMismatch { local: FeedKey, remote: FeedKey },

    /// Wire frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] bloomcast_store::StoreError),

    /// Operation on a peer that has already closed.
    #[error("peer closed")]
    PeerClosed,

    /// Operation on a node that has already closed.
    #[error("node closed")]
    NodeClosed,
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
