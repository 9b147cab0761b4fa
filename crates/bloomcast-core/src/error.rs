//! Error types for Bloomcast core primitives.

use thiserror::Error;

/// Core errors that can occur while handling keys and chains.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,
}
