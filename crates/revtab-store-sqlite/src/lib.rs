//! SQLite backend for the revtab diff store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write runs inside an
//! `IMMEDIATE` transaction: SQLite admits one writer at a time, which gives
//! ingestion the serializable isolation the chain-repair logic relies on.

mod encode;
mod ingest;
mod ledger;
mod pool;
mod projection;
mod schema;
mod state;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use pool::Pool;
pub use store::{SqliteStore, StoreOptions};
