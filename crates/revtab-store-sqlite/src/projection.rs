//! The point projection tables: `point_version_list` (raw versions already
//! projected) and `point_diffs`.
//!
//! Projection reads only committed raw diffs, so it can run at any time and
//! any number of times; versions already in `point_version_list` are
//! skipped.

use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use tracing::{debug, info, warn};

use revtab_core::{point::Projection, store::ProjectionReport};

use crate::{
  Result,
  encode::{RawPoint, RawPointDiff, RawVersion},
};

/// A raw diff not yet projected, with the location left interned.
struct PendingDiff {
  version:          RawVersion,
  measurement_type: String,
  location_id:      i64,
  week:             String,
  old_value:        Option<String>,
  new_value:        Option<String>,
}

pub fn update_points(conn: &mut Connection) -> Result<ProjectionReport> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let pending_versions: Vec<RawVersion> = {
    let mut stmt = tx.prepare(
      "SELECT v.release_date, v.parse_time
       FROM raw_version_list v
       WHERE NOT EXISTS (
         SELECT 1 FROM point_version_list p
         WHERE p.release_date = v.release_date AND p.parse_time = v.parse_time
       )
       ORDER BY v.release_date, v.parse_time",
    )?;
    let rows = stmt.query_map([], RawVersion::from_row)?;
    rows.collect::<rusqlite::Result<_>>()?
  };

  if pending_versions.is_empty() {
    debug!("point projection is up to date");
    return Ok(ProjectionReport::default());
  }

  // `old_value` is the cell's value just before the diff's version.
  let pending_diffs: Vec<PendingDiff> = {
    let mut stmt = tx.prepare(
      "SELECT d.release_date, d.parse_time, m.text, d.location_id, w.text,
              (SELECT prior.new_value
               FROM raw_diffs prior
               WHERE prior.measurement_type_id = d.measurement_type_id
                 AND prior.location_id = d.location_id
                 AND prior.week_id = d.week_id
                 AND (prior.release_date, prior.parse_time) < (d.release_date, d.parse_time)
               ORDER BY prior.release_date DESC, prior.parse_time DESC
               LIMIT 1),
              d.new_value
       FROM raw_diffs d
       JOIN measurement_type_pool m ON m.id = d.measurement_type_id
       JOIN week_pool             w ON w.id = d.week_id
       WHERE NOT EXISTS (
         SELECT 1 FROM point_version_list p
         WHERE p.release_date = d.release_date AND p.parse_time = d.parse_time
       )
       ORDER BY d.release_date, d.parse_time",
    )?;
    let rows = stmt.query_map([], |row| {
      Ok(PendingDiff {
        version:          RawVersion::from_row(row)?,
        measurement_type: row.get(2)?,
        location_id:      row.get(3)?,
        week:             row.get(4)?,
        old_value:        row.get(5)?,
        new_value:        row.get(6)?,
      })
    })?;
    rows.collect::<rusqlite::Result<_>>()?
  };

  let mut projection = Projection::<i64>::new();
  for diff in &pending_diffs {
    let version = diff.version.decode()?;
    let skipped = projection.push(
      version,
      &diff.measurement_type,
      diff.location_id,
      &diff.week,
      diff.old_value.as_deref(),
      diff.new_value.as_deref(),
    )?;
    if let Some(reason) = skipped {
      warn!(
        %version,
        measurement_type = %diff.measurement_type,
        week = %diff.week,
        %reason,
        "raw diff does not project onto a point value"
      );
    }
  }

  {
    let mut stmt = tx.prepare(
      "INSERT INTO point_version_list (release_date, parse_time) VALUES (?1, ?2)",
    )?;
    for version in &pending_versions {
      stmt.execute([&version.release_date, &version.parse_time])?;
    }
  }

  {
    let mut stmt = tx.prepare(
      "INSERT INTO point_diffs (release_date, parse_time, location_id, epiweek, new_value)
       VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for point in &projection.diffs {
      let version = RawVersion::encode(point.version)?;
      stmt.execute(rusqlite::params![
        version.release_date,
        version.parse_time,
        point.location,
        point.epiweek.to_yyyyww(),
        point.new_value,
      ])?;
    }
  }

  tx.commit()?;

  let report = ProjectionReport {
    versions:    pending_versions.len(),
    point_diffs: projection.diffs.len(),
    skipped:     projection.skipped,
  };
  info!(
    versions = report.versions,
    point_diffs = report.point_diffs,
    skipped = report.skipped,
    "projected raw diffs onto points"
  );
  Ok(report)
}

/// Forget the projection of `version` so the next run reprojects it. Used
/// when chain repair rewrites that version's raw diff.
pub fn invalidate(conn: &Connection, version: &RawVersion) -> rusqlite::Result<usize> {
  let diffs = conn.execute(
    "DELETE FROM point_diffs WHERE release_date = ?1 AND parse_time = ?2",
    [&version.release_date, &version.parse_time],
  )?;
  conn.execute(
    "DELETE FROM point_version_list WHERE release_date = ?1 AND parse_time = ?2",
    [&version.release_date, &version.parse_time],
  )?;
  Ok(diffs)
}

pub fn point(
  conn: &Connection,
  location: &str,
  epiweek: i64,
  version: &RawVersion,
) -> rusqlite::Result<Option<i64>> {
  let latest: Option<Option<i64>> = conn
    .prepare_cached(
      "SELECT p.new_value
       FROM point_diffs p
       JOIN location_pool l ON l.id = p.location_id
       WHERE l.text = ?1 AND p.epiweek = ?2
         AND (p.release_date, p.parse_time) <= (?3, ?4)
       ORDER BY p.release_date DESC, p.parse_time DESC
       LIMIT 1",
    )?
    .query_row(
      rusqlite::params![location, epiweek, version.release_date, version.parse_time],
      |row| row.get(0),
    )
    .optional()?;
  Ok(latest.flatten())
}

pub fn points_as_of(conn: &Connection, version: &RawVersion) -> rusqlite::Result<Vec<RawPoint>> {
  let mut stmt = conn.prepare_cached(
    "SELECT l.text, latest.epiweek, latest.new_value
     FROM (
       SELECT location_id, epiweek, new_value,
              ROW_NUMBER() OVER (
                PARTITION BY location_id, epiweek
                ORDER BY release_date DESC, parse_time DESC
              ) AS rn
       FROM point_diffs
       WHERE (release_date, parse_time) <= (?1, ?2)
     ) AS latest
     JOIN location_pool l ON l.id = latest.location_id
     WHERE latest.rn = 1 AND latest.new_value IS NOT NULL",
  )?;
  let rows = stmt.query_map([&version.release_date, &version.parse_time], |row| {
    Ok(RawPoint {
      location: row.get(0)?,
      epiweek:  row.get(1)?,
      value:    row.get(2)?,
    })
  })?;
  rows.collect()
}

/// Every point diff, grouped by point with versions ascending.
pub fn point_log(conn: &Connection) -> rusqlite::Result<Vec<RawPointDiff>> {
  let mut stmt = conn.prepare_cached(
    "SELECT p.release_date, p.parse_time, l.text, p.epiweek, p.new_value
     FROM point_diffs p
     JOIN location_pool l ON l.id = p.location_id
     ORDER BY l.text, p.epiweek, p.release_date, p.parse_time",
  )?;
  let rows = stmt.query_map([], RawPointDiff::from_row)?;
  rows.collect()
}
