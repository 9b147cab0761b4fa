//! # Bloomcast Node
//!
//! The peer synchronization orchestrator: replicates an append-only,
//! cryptographically-authorized feed across a mesh of peers using
//! membership-filter reconciliation instead of full-history transfer.
//!
//! ## Overview
//!
//! A [`Node`] owns shared storage, the current authorization chain, an
//! optional trust collaborator, the set of live [`Peer`]s and the set of
//! active [`Watcher`]s. Each peer drives the sync protocol over one secured
//! channel: it periodically advertises the local filter summary (full
//! mode), answers range requests (partial mode), and pushes freshly
//! accepted values. Values accepted from one peer fan out to every other
//! peer and to every matching watcher.
//!
//! ## Key Properties
//!
//! - **Idempotent**: re-delivered values are deduplicated by the store and
//!   never re-broadcast
//! - **Best-effort fan-out**: a peer disconnecting mid-broadcast is dropped
//!   silently, never fails the insert
//! - **Isolated failures**: a broken channel tears down one peer, not the
//!   node
//!
//! ## Message Flow
//!
//! ```text
//! Node A                              Node B
//!   |-------- Sync {summary} -------->|
//!   |<------- Data {values} ----------|   values likely missing on A
//!   |<------- Sync {summary} ---------|
//!   |-------- Data {values} --------->|   values likely missing on B
//!   |                                 |
//!   |-------- Request {range} ------->|   partial-mode pull
//!   |<------- Data {values} ----------|
//! ```

pub mod convergence;
pub mod error;
pub mod messages;
pub mod node;
pub mod peer;
pub mod transport;
pub mod trust;
pub mod watcher;

pub use convergence::{state_digest, verify_convergence, ConvergenceResult};
pub use error::{NodeError, Result};
pub use messages::{limits, WireMessage};
pub use node::{Node, NodeConfig, DEFAULT_POLL_INTERVAL};
pub use peer::{Peer, PeerConfig, PeerEvent, PeerId};
pub use transport::{memory, Channel, ChannelEvent, Connector, HandshakeConfig};
pub use trust::{MemoryTrust, Trust};
pub use watcher::{Watcher, WatcherId};
