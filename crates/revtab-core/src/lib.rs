//! Core types and algorithms for the revtab versioned-table diff store.
//!
//! A table published repeatedly by an external source is recorded as a chain
//! of per-cell diffs between consecutive snapshots. This crate holds the pure
//! parts: versions, snapshots, the diff and chain-repair algorithms, the point
//! projection, and the [`store::DiffStore`] trait. Storage backends live in
//! their own crates.

pub mod chain;
pub mod error;
pub mod ledger;
pub mod period;
pub mod point;
pub mod snapshot;
pub mod store;
pub mod version;

pub use error::{Error, Result};
