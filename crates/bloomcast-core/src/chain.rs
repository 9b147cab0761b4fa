//! Authorization chains.
//!
//! A [`Chain`] is an ordered sequence of signed delegations proving that a
//! signing key may append to a feed. The root keyholder carries an empty
//! chain. Each [`Link`] delegates append authority from its issuer to a
//! further key, optionally bounded by an expiration time.
//!
//! Validating a chain against a trust graph is the trust collaborator's
//! job; replication only ever measures chain *length* and prefers the
//! shortest proof observed, to minimize what future handshakes must carry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::keys::{FeedKey, FeedKeypair};

/// One signed delegation of append authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// The key receiving authority.
    pub public_key: FeedKey,
    /// Unix seconds after which the delegation is void; 0 = no expiry.
    pub expiration: u64,
    /// Issuer's Ed25519 signature over the link body.
    pub signature: Bytes,
}

impl Link {
    /// Issue a delegation from `issuer` to `delegate`.
    pub fn delegate(issuer: &FeedKeypair, delegate: FeedKey, expiration: u64) -> Self {
        let body = Self::signed_body(&delegate, expiration);
        Self {
            public_key: delegate,
            expiration,
            signature: Bytes::copy_from_slice(&issuer.sign(&body)),
        }
    }

    /// Verify the link was issued by `issuer`.
    pub fn verify(&self, issuer: &FeedKey) -> Result<(), CoreError> {
        let body = Self::signed_body(&self.public_key, self.expiration);
        issuer.verify(&body, &self.signature)
    }

    fn signed_body(delegate: &FeedKey, expiration: u64) -> Vec<u8> {
        let mut body = Vec::with_capacity(32 + 8);
        body.extend_from_slice(delegate.as_bytes());
        body.extend_from_slice(&expiration.to_le_bytes());
        body
    }
}

/// An ordered delegation proof.
///
/// The empty chain is the root keyholder's proof. Ordering is from the
/// feed key outwards: `links[0]` is signed by the feed key itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    links: Vec<Link>,
}

impl Chain {
    /// The root keyholder's (empty) chain.
    pub fn root() -> Self {
        Self { links: Vec::new() }
    }

    /// Build a chain from links.
    pub fn from_links(links: Vec<Link>) -> Self {
        Self { links }
    }

    /// Number of delegations in the proof.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether this is the root chain.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The delegation links, feed key outwards.
    pub fn links(&self) -> &[Link] {
        &self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_chain_is_empty() {
        let chain = Chain::root();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_link_delegate_verify() {
        let root = FeedKeypair::from_seed(&[0x11; 32]);
        let member = FeedKeypair::from_seed(&[0x22; 32]);

        let link = Link::delegate(&root, member.feed_key(), 0);
        link.verify(&root.feed_key()).expect("valid delegation");

        // Wrong issuer
        let other = FeedKeypair::from_seed(&[0x33; 32]);
        assert!(link.verify(&other.feed_key()).is_err());
    }

    #[test]
    fn test_chain_length() {
        let root = FeedKeypair::from_seed(&[0x11; 32]);
        let a = FeedKeypair::from_seed(&[0x22; 32]);
        let b = FeedKeypair::from_seed(&[0x33; 32]);

        let chain = Chain::from_links(vec![
            Link::delegate(&root, a.feed_key(), 0),
            Link::delegate(&a, b.feed_key(), 0),
        ]);
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
    }
}
