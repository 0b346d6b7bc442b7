//! Error type for `revtab-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] revtab_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Built through the `From<rusqlite::Error>` impl below, which lifts lock
  /// contention into [`revtab_core::Error::TransactionConflict`].
  #[error("sqlite error: {0}")]
  Sqlite(rusqlite::Error),

  /// A stored column could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    if is_contention(&e) {
      Error::Core(revtab_core::Error::TransactionConflict)
    } else {
      Error::Sqlite(e)
    }
  }
}

impl Error {
  /// Whether retrying the whole operation from scratch may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      Error::Core(revtab_core::Error::TransactionConflict) => true,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => is_contention(e),
      _ => false,
    }
  }

  pub fn is_duplicate_version(&self) -> bool {
    matches!(self, Error::Core(revtab_core::Error::DuplicateVersion(_)))
  }
}

fn is_contention(e: &rusqlite::Error) -> bool {
  matches!(
    e.sqlite_error_code(),
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
