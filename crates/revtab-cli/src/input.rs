//! The snapshot file accepted by `revtab record`.

use std::path::Path;

use anyhow::Context as _;
use chrono::{NaiveDate, NaiveDateTime};
use revtab_core::{
  snapshot::{Snapshot, SnapshotRow},
  version::Version,
};
use serde::Deserialize;

/// `{"release_date": "2014-10-03", "parse_time": "2014-10-03T12:00:00", "rows": [...]}`
#[derive(Debug, Deserialize)]
pub struct SnapshotFile {
  pub release_date: NaiveDate,
  pub parse_time:   NaiveDateTime,
  pub rows:         Vec<SnapshotRow>,
}

impl SnapshotFile {
  pub fn read(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading snapshot file {}", path.display()))?;
    serde_json::from_str(&raw)
      .with_context(|| format!("parsing snapshot file {}", path.display()))
  }

  pub fn into_snapshot(self) -> revtab_core::Result<Snapshot> {
    Snapshot::from_rows(Version::new(self.release_date, self.parse_time), self.rows)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"{
    "release_date": "2014-10-03",
    "parse_time": "2014-10-03T12:30:00.250000",
    "rows": [
      {"measurement_type": "2014-15", "location": "AL", "week": "10-01", "value": "3"},
      {"measurement_type": "2014-15", "location": "AK", "week": "10-01", "value": "0"}
    ]
  }"#;

  #[test]
  fn parses_and_validates() {
    let file: SnapshotFile = serde_json::from_str(SAMPLE).unwrap();
    let snapshot = file.into_snapshot().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.version().to_string(), "2014-10-03 @ 2014-10-03T12:30:00.250000");
  }

  #[test]
  fn empty_value_is_malformed() {
    let file: SnapshotFile = serde_json::from_str(
      r#"{"release_date": "2014-10-03", "parse_time": "2014-10-03T12:30:00",
          "rows": [{"measurement_type": "a", "location": "b", "week": "c", "value": ""}]}"#,
    )
    .unwrap();
    assert!(matches!(
      file.into_snapshot(),
      Err(revtab_core::Error::MalformedSnapshot(_))
    ));
  }
}
