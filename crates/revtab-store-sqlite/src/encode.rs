//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Release dates are stored as `YYYY-MM-DD` and parse times as
//! `YYYY-MM-DD HH:MM:SS.ffffff`. Both are fixed width, so SQLite's text
//! ordering (and row-value comparison) matches the version timeline.

use chrono::{NaiveDate, NaiveDateTime};
use revtab_core::{
  chain::DiffEntry,
  period::Epiweek,
  point::{PointDiff, PointKey},
  snapshot::CellKey,
  version::Version,
};

use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const PARSE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ─── Version ─────────────────────────────────────────────────────────────────

pub fn encode_release_date(date: NaiveDate) -> String {
  date.format(DATE_FORMAT).to_string()
}

pub fn decode_release_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::Decode(format!("release date {s:?}: {e}")))
}

pub fn encode_parse_time(t: NaiveDateTime) -> String {
  t.format(PARSE_TIME_FORMAT).to_string()
}

pub fn decode_parse_time(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
    .map_err(|e| Error::Decode(format!("parse time {s:?}: {e}")))
}

/// A version in its column form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVersion {
  pub release_date: String,
  pub parse_time:   String,
}

impl RawVersion {
  /// Fails for versions outside the four-digit years, whose text would not
  /// sort with the rest.
  pub fn encode(version: Version) -> Result<Self> {
    if !version.is_storable() {
      return Err(revtab_core::Error::VersionOutOfRange(version).into());
    }
    Ok(Self {
      release_date: encode_release_date(version.release_date()),
      parse_time:   encode_parse_time(version.parse_time()),
    })
  }

  pub fn decode(&self) -> Result<Version> {
    Ok(Version::new(
      decode_release_date(&self.release_date)?,
      decode_parse_time(&self.parse_time)?,
    ))
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      release_date: row.get(0)?,
      parse_time:   row.get(1)?,
    })
  }
}

// ─── Cells ───────────────────────────────────────────────────────────────────

/// A cell identified by its interned pool ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIds {
  pub measurement_type: i64,
  pub location:         i64,
  pub week:             i64,
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A `raw_diffs` row joined with the three pools.
pub struct RawDiff {
  pub release_date:     String,
  pub parse_time:       String,
  pub measurement_type: String,
  pub location:         String,
  pub week:             String,
  pub new_value:        Option<String>,
}

impl RawDiff {
  /// Column order: release_date, parse_time, measurement_type, location,
  /// week, new_value.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      release_date:     row.get(0)?,
      parse_time:       row.get(1)?,
      measurement_type: row.get(2)?,
      location:         row.get(3)?,
      week:             row.get(4)?,
      new_value:        row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<DiffEntry> {
    let version = RawVersion {
      release_date: self.release_date,
      parse_time:   self.parse_time,
    }
    .decode()?;
    Ok(DiffEntry {
      version,
      cell: CellKey::new(self.measurement_type, self.location, self.week),
      new_value: self.new_value,
    })
  }
}

/// A reconstructed `point_diffs` value joined with the location pool.
pub struct RawPoint {
  pub location: String,
  pub epiweek:  i64,
  pub value:    i64,
}

impl RawPoint {
  pub fn into_point(self) -> Result<(PointKey, i64)> {
    let epiweek = Epiweek::from_yyyyww(self.epiweek)?;
    Ok((PointKey { location: self.location, epiweek }, self.value))
  }
}

/// A `point_diffs` row joined with the location pool.
pub struct RawPointDiff {
  pub version:   RawVersion,
  pub location:  String,
  pub epiweek:   i64,
  pub new_value: Option<i64>,
}

impl RawPointDiff {
  /// Column order: release_date, parse_time, location, epiweek, new_value.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version:   RawVersion::from_row(row)?,
      location:  row.get(2)?,
      epiweek:   row.get(3)?,
      new_value: row.get(4)?,
    })
  }

  pub fn into_diff(self) -> Result<PointDiff> {
    Ok(PointDiff {
      version:   self.version.decode()?,
      location:  self.location,
      epiweek:   Epiweek::from_yyyyww(self.epiweek)?,
      new_value: self.new_value,
    })
  }
}
