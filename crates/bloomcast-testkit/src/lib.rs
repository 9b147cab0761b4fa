//! # Bloomcast Testkit
//!
//! Fixtures, generators, and helpers for testing Bloomcast nodes. The
//! cross-node integration scenarios live in this crate's `tests/`
//! directory.

pub mod fixtures;
pub mod generators;

pub use fixtures::{connect, init_tracing, values, wait_until, NodeFixture};
