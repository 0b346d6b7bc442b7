//! Reconstruction queries over `raw_diffs`.
//!
//! The effective value of a cell as of a version is the `new_value` of its
//! latest diff at or before that version. A window over the per-cell index
//! picks that diff without replaying the log.

use rusqlite::Connection;

use revtab_core::chain::{CellDiff, State};

use crate::encode::{CellIds, RawDiff, RawVersion};

/// Latest diff per cell at or before `(?1, ?2)`, tombstones included.
const LATEST_PER_CELL: &str = "
  SELECT release_date, parse_time, measurement_type_id, location_id, week_id, new_value
  FROM (
    SELECT d.*,
           ROW_NUMBER() OVER (
             PARTITION BY measurement_type_id, location_id, week_id
             ORDER BY release_date DESC, parse_time DESC
           ) AS rn
    FROM raw_diffs d
    WHERE (release_date, parse_time) <= (?1, ?2)
  )
  WHERE rn = 1";

fn cell_ids(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<CellIds> {
  Ok(CellIds {
    measurement_type: row.get(first)?,
    location:         row.get(first + 1)?,
    week:             row.get(first + 2)?,
  })
}

/// The interned state as of `version`.
pub fn state_as_of(conn: &Connection, version: &RawVersion) -> rusqlite::Result<State<CellIds>> {
  let sql = format!(
    "SELECT measurement_type_id, location_id, week_id, new_value
     FROM ({LATEST_PER_CELL})
     WHERE new_value IS NOT NULL"
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let rows = stmt.query_map([&version.release_date, &version.parse_time], |row| {
    Ok((cell_ids(row, 0)?, row.get::<_, String>(3)?))
  })?;
  rows.collect()
}

/// The table as of `version`, with keys resolved through the pools.
pub fn table_as_of(conn: &Connection, version: &RawVersion) -> rusqlite::Result<Vec<RawDiff>> {
  let sql = format!(
    "SELECT latest.release_date, latest.parse_time, m.text, l.text, w.text, latest.new_value
     FROM ({LATEST_PER_CELL}) AS latest
     JOIN measurement_type_pool m ON m.id = latest.measurement_type_id
     JOIN location_pool         l ON l.id = latest.location_id
     JOIN week_pool             w ON w.id = latest.week_id
     WHERE latest.new_value IS NOT NULL"
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let rows = stmt.query_map([&version.release_date, &version.parse_time], RawDiff::from_row)?;
  rows.collect()
}

/// The interned diff stored at exactly `version`.
pub fn diffs_at(conn: &Connection, version: &RawVersion) -> rusqlite::Result<Vec<CellDiff<CellIds>>> {
  let mut stmt = conn.prepare_cached(
    "SELECT measurement_type_id, location_id, week_id, new_value
     FROM raw_diffs
     WHERE release_date = ?1 AND parse_time = ?2
     ORDER BY measurement_type_id, location_id, week_id",
  )?;
  let rows = stmt.query_map([&version.release_date, &version.parse_time], |row| {
    Ok((cell_ids(row, 0)?, row.get::<_, Option<String>>(3)?))
  })?;
  rows.collect()
}

/// The diff at exactly `version`, with keys resolved through the pools.
pub fn resolved_diffs_at(conn: &Connection, version: &RawVersion) -> rusqlite::Result<Vec<RawDiff>> {
  let mut stmt = conn.prepare_cached(
    "SELECT d.release_date, d.parse_time, m.text, l.text, w.text, d.new_value
     FROM raw_diffs d
     JOIN measurement_type_pool m ON m.id = d.measurement_type_id
     JOIN location_pool         l ON l.id = d.location_id
     JOIN week_pool             w ON w.id = d.week_id
     WHERE d.release_date = ?1 AND d.parse_time = ?2",
  )?;
  let rows = stmt.query_map([&version.release_date, &version.parse_time], RawDiff::from_row)?;
  rows.collect()
}

/// Every diff, grouped by cell with versions ascending.
pub fn diff_log(conn: &Connection) -> rusqlite::Result<Vec<RawDiff>> {
  let mut stmt = conn.prepare_cached(
    "SELECT d.release_date, d.parse_time, m.text, l.text, w.text, d.new_value
     FROM raw_diffs d
     JOIN measurement_type_pool m ON m.id = d.measurement_type_id
     JOIN location_pool         l ON l.id = d.location_id
     JOIN week_pool             w ON w.id = d.week_id
     ORDER BY d.measurement_type_id, d.location_id, d.week_id,
              d.release_date, d.parse_time",
  )?;
  let rows = stmt.query_map([], RawDiff::from_row)?;
  rows.collect()
}

pub fn count_diffs_at(conn: &Connection, version: &RawVersion) -> rusqlite::Result<i64> {
  conn
    .prepare_cached(
      "SELECT COUNT(*) FROM raw_diffs WHERE release_date = ?1 AND parse_time = ?2",
    )?
    .query_row([&version.release_date, &version.parse_time], |row| row.get(0))
}

/// Write `diffs` at `version`. Returns the number of rows written.
pub fn insert_diffs(
  conn: &Connection,
  version: &RawVersion,
  diffs: &[CellDiff<CellIds>],
) -> rusqlite::Result<usize> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO raw_diffs (
       release_date, parse_time, measurement_type_id, location_id, week_id, new_value
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )?;
  for (cell, new_value) in diffs {
    stmt.execute(rusqlite::params![
      version.release_date,
      version.parse_time,
      cell.measurement_type,
      cell.location,
      cell.week,
      new_value,
    ])?;
  }
  Ok(diffs.len())
}

pub fn delete_diffs_at(conn: &Connection, version: &RawVersion) -> rusqlite::Result<usize> {
  conn.execute(
    "DELETE FROM raw_diffs WHERE release_date = ?1 AND parse_time = ?2",
    [&version.release_date, &version.parse_time],
  )
}
