//! Snapshots: full table states delivered by the parsing collaborator.
//!
//! A table is stored in long form: every non-empty cell becomes one
//! `(measurement_type, location, week) → value` entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, version::Version};

/// Longest key or value the storage layer accepts, in characters.
pub const MAX_KEY_LEN: usize = 255;
pub const MAX_VALUE_LEN: usize = 255;

// ─── Cells ───────────────────────────────────────────────────────────────────

/// Human-legible identity of one cell of the table.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CellKey {
  /// Column header (anything other than the row-axis column).
  pub measurement_type: String,
  /// The set of reporting locations the table covers.
  pub location:         String,
  /// Row-axis entry.
  pub week:             String,
}

impl CellKey {
  pub fn new(
    measurement_type: impl Into<String>,
    location: impl Into<String>,
    week: impl Into<String>,
  ) -> Self {
    Self {
      measurement_type: measurement_type.into(),
      location:         location.into(),
      week:             week.into(),
    }
  }
}

/// A materialised table: every present cell and its value.
pub type Table = BTreeMap<CellKey, String>;

/// One `(measurement_type, location, week, value)` tuple as produced by the
/// parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
  pub measurement_type: String,
  pub location:         String,
  pub week:             String,
  pub value:            String,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// A validated full table state stamped with the version it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
  version: Version,
  cells:   Table,
}

impl Snapshot {
  /// An empty snapshot; recording it removes every cell.
  pub fn new(version: Version) -> Self {
    Self { version, cells: Table::new() }
  }

  /// Build and validate a snapshot from parser output.
  pub fn from_rows(
    version: Version,
    rows: impl IntoIterator<Item = SnapshotRow>,
  ) -> Result<Self> {
    if !version.is_storable() {
      return Err(Error::MalformedSnapshot(format!(
        "version {version} is outside the storable years"
      )));
    }
    let mut snapshot = Self::new(version);
    for row in rows {
      snapshot.insert(
        CellKey::new(row.measurement_type, row.location, row.week),
        row.value,
      )?;
    }
    Ok(snapshot)
  }

  /// Add one cell. Fails if the cell is already present or a key or value
  /// would not fit the storage layer.
  pub fn insert(&mut self, cell: CellKey, value: impl Into<String>) -> Result<()> {
    let value = value.into();
    validate_key("measurement type", &cell.measurement_type)?;
    validate_key("location", &cell.location)?;
    validate_key("week", &cell.week)?;
    validate_value(&cell, &value)?;

    if self.cells.contains_key(&cell) {
      return Err(Error::MalformedSnapshot(format!(
        "cell {cell:?} appears more than once"
      )));
    }
    self.cells.insert(cell, value);
    Ok(())
  }

  pub fn version(&self) -> Version { self.version }

  pub fn cells(&self) -> &Table { &self.cells }

  pub fn len(&self) -> usize { self.cells.len() }

  pub fn is_empty(&self) -> bool { self.cells.is_empty() }
}

fn validate_key(axis: &str, key: &str) -> Result<()> {
  if key.chars().count() > MAX_KEY_LEN {
    return Err(Error::MalformedSnapshot(format!(
      "{axis} key is longer than {MAX_KEY_LEN} characters: {key:?}"
    )));
  }
  if key.chars().any(char::is_control) {
    return Err(Error::MalformedSnapshot(format!(
      "{axis} key contains control characters: {key:?}"
    )));
  }
  Ok(())
}

fn validate_value(cell: &CellKey, value: &str) -> Result<()> {
  // An empty value must be omitted by the producer, never stored.
  if value.is_empty() {
    return Err(Error::MalformedSnapshot(format!(
      "cell {cell:?} has an empty value"
    )));
  }
  if value.chars().count() > MAX_VALUE_LEN {
    return Err(Error::MalformedSnapshot(format!(
      "value of cell {cell:?} is longer than {MAX_VALUE_LEN} characters"
    )));
  }
  Ok(())
}
