//! SQL side of the version ledger (`raw_version_list`).

use rusqlite::{Connection, ErrorCode, OptionalExtension as _};

use crate::{Error, Result, encode::RawVersion};

pub fn contains(conn: &Connection, version: &RawVersion) -> rusqlite::Result<bool> {
  conn
    .prepare_cached(
      "SELECT 1 FROM raw_version_list WHERE release_date = ?1 AND parse_time = ?2",
    )?
    .query_row([&version.release_date, &version.parse_time], |_| Ok(true))
    .optional()
    .map(|found| found.unwrap_or(false))
}

/// Insert `version`. A primary-key collision is reported as
/// [`revtab_core::Error::DuplicateVersion`] so callers can tell it apart from
/// other storage failures.
pub fn register(conn: &Connection, version: &RawVersion) -> Result<()> {
  let inserted = conn.execute(
    "INSERT INTO raw_version_list (release_date, parse_time) VALUES (?1, ?2)",
    [&version.release_date, &version.parse_time],
  );
  match inserted {
    Ok(_) => Ok(()),
    Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
      Err(revtab_core::Error::DuplicateVersion(version.decode()?).into())
    }
    Err(e) => Err(Error::from(e)),
  }
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<RawVersion>> {
  let mut stmt = conn.prepare_cached(
    "SELECT release_date, parse_time FROM raw_version_list
     ORDER BY release_date, parse_time",
  )?;
  let rows = stmt.query_map([], RawVersion::from_row)?;
  rows.collect()
}

pub fn previous(conn: &Connection, version: &RawVersion) -> rusqlite::Result<Option<RawVersion>> {
  conn
    .prepare_cached(
      "SELECT release_date, parse_time FROM raw_version_list
       WHERE (release_date, parse_time) < (?1, ?2)
       ORDER BY release_date DESC, parse_time DESC
       LIMIT 1",
    )?
    .query_row([&version.release_date, &version.parse_time], RawVersion::from_row)
    .optional()
}

pub fn next(conn: &Connection, version: &RawVersion) -> rusqlite::Result<Option<RawVersion>> {
  conn
    .prepare_cached(
      "SELECT release_date, parse_time FROM raw_version_list
       WHERE (release_date, parse_time) > (?1, ?2)
       ORDER BY release_date, parse_time
       LIMIT 1",
    )?
    .query_row([&version.release_date, &version.parse_time], RawVersion::from_row)
    .optional()
}

pub fn latest_for(conn: &Connection, release_date: &str) -> rusqlite::Result<Option<RawVersion>> {
  conn
    .prepare_cached(
      "SELECT release_date, parse_time FROM raw_version_list
       WHERE release_date = ?1
       ORDER BY parse_time DESC
       LIMIT 1",
    )?
    .query_row([release_date], RawVersion::from_row)
    .optional()
}
