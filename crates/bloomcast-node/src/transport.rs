//! Transport abstraction for the sync protocol.
//!
//! A [`Channel`] is one secured, authenticated connection to a remote
//! peer: it carries typed [`WireMessage`]s plus the out-of-band events the
//! handshake and re-keying produce (`Secure`, `ChainUpdate`). A
//! [`Connector`] upgrades a raw bidirectional transport into a channel by
//! running the authenticated handshake with the node's feed credentials.
//!
//! Encryption, signature verification, and the handshake wire format are
//! the transport implementation's business; this crate only consumes the
//! typed surface. The [`memory`] module provides the in-process
//! implementation used by tests.

use async_trait::async_trait;
use bytes::Bytes;

use bloomcast_core::{Chain, FeedKey};

use crate::error::Result;
use crate::messages::WireMessage;

/// Events surfaced by a channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Handshake completed; carries the remote's authorization chain.
    Secure {
        /// The delegation proof the remote presented.
        chain: Chain,
    },
    /// A protocol message arrived.
    Message(WireMessage),
    /// The remote announced a new authorization chain mid-session.
    ChainUpdate {
        /// The announced chain.
        chain: Chain,
    },
}

/// Credentials used to secure a connection.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// The feed both ends must agree on.
    pub feed_key: FeedKey,
    /// Secret key material proving write authority.
    pub private_key: Bytes,
    /// The local node's current delegation proof.
    pub chain: Chain,
}

/// One secured connection to a remote peer.
///
/// Implementations own framing, encryption, and per-connection ordering.
/// `recv` returning `Ok(None)` means the channel closed; both `recv` after
/// close and repeated `close` calls are harmless.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send a protocol message to the remote.
    async fn send(&self, message: WireMessage) -> Result<()>;

    /// Receive the next event. `Ok(None)` signals an orderly close.
    async fn recv(&self) -> Result<Option<ChannelEvent>>;

    /// Close the channel. Idempotent.
    async fn close(&self);
}

/// Upgrades a raw transport into a secured [`Channel`].
#[async_trait]
pub trait Connector: Send {
    /// Run the authenticated handshake, proving write authority for
    /// `config.feed_key`.
    async fn secure(self: Box<Self>, config: HandshakeConfig) -> Result<Box<dyn Channel>>;
}

/// In-process transport for tests.
///
/// Frames are CBOR-encoded and pushed over bounded channels, so the memory
/// transport exercises the same encode/decode path a socket transport
/// would. The "handshake" is a plaintext hello exchange that checks feed
/// key agreement and trades chains; no actual signatures are verified.
pub mod memory {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use tokio::sync::{mpsc, Mutex};

    use super::*;
    use crate::error::NodeError;

    const FRAME_BUFFER: usize = 256;

    /// On-the-wire frame for the memory transport.
    #[derive(serde::Serialize, serde::Deserialize)]
    enum Frame {
        Hello { feed_key: FeedKey, chain: Chain },
        Message(WireMessage),
        ChainUpdate { chain: Chain },
    }

    fn encode(frame: &Frame) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(frame, &mut buf)
            .map_err(|e| NodeError::Codec(e.to_string()))?;
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Frame> {
        ciborium::from_reader(bytes).map_err(|e| NodeError::Codec(e.to_string()))
    }

    /// Create a linked pair of raw connectors.
    ///
    /// Each side hands its connector to `Node::add_peer`; the handshakes
    /// must run concurrently (each waits for the other's hello).
    pub fn pair() -> (MemoryConnector, MemoryConnector) {
        let (a_tx, a_rx) = mpsc::channel(FRAME_BUFFER);
        let (b_tx, b_rx) = mpsc::channel(FRAME_BUFFER);
        (
            MemoryConnector { tx: a_tx, rx: b_rx },
            MemoryConnector { tx: b_tx, rx: a_rx },
        )
    }

    /// Secure both ends of a fresh pair at once.
    ///
    /// Convenience for tests that want already-secured channels (the
    /// `Node::add_stream` path).
    pub async fn secure_pair(
        a: HandshakeConfig,
        b: HandshakeConfig,
    ) -> Result<(MemoryChannel, MemoryChannel)> {
        let (conn_a, conn_b) = pair();
        let (chan_a, chan_b) = tokio::join!(conn_a.secure_inner(a), conn_b.secure_inner(b));
        Ok((chan_a?, chan_b?))
    }

    /// One unsecured end of an in-memory duplex.
    pub struct MemoryConnector {
        tx: mpsc::Sender<Vec<u8>>,
        rx: mpsc::Receiver<Vec<u8>>,
    }

    impl MemoryConnector {
        async fn secure_inner(mut self, config: HandshakeConfig) -> Result<MemoryChannel> {
            let hello = Frame::Hello {
                feed_key: config.feed_key,
                chain: config.chain.clone(),
            };
            self.tx
                .send(encode(&hello)?)
                .await
                .map_err(|_| NodeError::Handshake("remote went away".into()))?;

            let bytes = self
                .rx
                .recv()
                .await
                .ok_or_else(|| NodeError::Handshake("closed before hello".into()))?;

            let (remote_key, remote_chain) = match decode(&bytes)? {
                Frame::Hello { feed_key, chain } => (feed_key, chain),
                _ => return Err(NodeError::Handshake("expected hello".into())),
            };

            if remote_key != config.feed_key {
                return Err(NodeError::FeedKeyMismatch {
                    local: config.feed_key,
                    remote: remote_key,
                });
            }

            Ok(MemoryChannel {
                tx: StdMutex::new(Some(self.tx)),
                rx: Mutex::new(self.rx),
                pending_secure: StdMutex::new(Some(remote_chain)),
                closed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn secure(self: Box<Self>, config: HandshakeConfig) -> Result<Box<dyn Channel>> {
            Ok(Box::new(self.secure_inner(config).await?))
        }
    }

    /// A secured in-memory channel.
    pub struct MemoryChannel {
        tx: StdMutex<Option<mpsc::Sender<Vec<u8>>>>,
        rx: Mutex<mpsc::Receiver<Vec<u8>>>,
        /// Remote chain from the handshake, surfaced as the first event.
        pending_secure: StdMutex<Option<Chain>>,
        closed: AtomicBool,
    }

    impl MemoryChannel {
        fn sender(&self) -> Result<mpsc::Sender<Vec<u8>>> {
            self.tx
                .lock()
                .unwrap()
                .clone()
                .ok_or(NodeError::PeerClosed)
        }

        async fn send_frame(&self, frame: &Frame) -> Result<()> {
            let tx = self.sender()?;
            tx.send(encode(frame)?)
                .await
                .map_err(|_| NodeError::Transport("peer disconnected".into()))
        }

        /// Announce a new local chain to the remote.
        ///
        /// A production transport emits this after re-keying; tests use it
        /// to exercise the node's chain-update policy.
        pub async fn announce_chain(&self, chain: &Chain) -> Result<()> {
            self.send_frame(&Frame::ChainUpdate {
                chain: chain.clone(),
            })
            .await
        }
    }

    #[async_trait]
    impl Channel for MemoryChannel {
        async fn send(&self, message: WireMessage) -> Result<()> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(NodeError::PeerClosed);
            }
            self.send_frame(&Frame::Message(message)).await
        }

        async fn recv(&self) -> Result<Option<ChannelEvent>> {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            if let Some(chain) = self.pending_secure.lock().unwrap().take() {
                return Ok(Some(ChannelEvent::Secure { chain }));
            }

            let mut rx = self.rx.lock().await;
            loop {
                let bytes = match rx.recv().await {
                    Some(bytes) => bytes,
                    None => return Ok(None),
                };

                match decode(&bytes) {
                    Ok(Frame::Message(message)) => {
                        if let Err(reason) = message.validate_limits() {
                            tracing::trace!(reason, "dropping oversized frame");
                            continue;
                        }
                        return Ok(Some(ChannelEvent::Message(message)));
                    }
                    Ok(Frame::ChainUpdate { chain }) => {
                        return Ok(Some(ChannelEvent::ChainUpdate { chain }));
                    }
                    Ok(Frame::Hello { .. }) => {
                        tracing::trace!("dropping unexpected hello frame");
                    }
                    Err(_) => {
                        tracing::trace!("dropping undecodable frame");
                    }
                }
            }
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            // Dropping the sender ends the remote's recv loop.
            self.tx.lock().unwrap().take();
        }
    }
}
