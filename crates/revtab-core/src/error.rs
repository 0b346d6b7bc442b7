//! Error types for `revtab-core`.

use thiserror::Error;

use crate::version::Version;

#[derive(Debug, Error)]
pub enum Error {
  /// The `(release_date, parse_time)` pair is already in the ledger.
  ///
  /// Benign when a producer retries the same logical snapshot; otherwise
  /// usually two parses landed inside one `parse_time` tick.
  #[error("version {0} is already recorded")]
  DuplicateVersion(Version),

  #[error("malformed snapshot: {0}")]
  MalformedSnapshot(String),

  /// An internal invariant of the diff chain does not hold. Always fatal to
  /// the surrounding transaction.
  #[error("diff chain integrity violation: {0}")]
  ChainIntegrity(String),

  /// The storage layer refused the transaction because of concurrent
  /// access. Retrying the whole operation from scratch is safe.
  #[error("transaction conflict; retry the operation")]
  TransactionConflict,

  #[error("unknown version: {0}")]
  UnknownVersion(Version),

  /// The version lies outside the years a store can order correctly.
  #[error("version {0} is outside the storable years 0000-9999")]
  VersionOutOfRange(Version),

  #[error("invalid period: {0}")]
  InvalidPeriod(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
