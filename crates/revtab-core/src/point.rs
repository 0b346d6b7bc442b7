//! The point projection: `(location, epiweek) → integer` derived from the raw
//! diff chain.
//!
//! Raw cells whose measurement type names a season and whose week is an
//! `MM-DD` date map one-to-one onto a point key. A point holds the integer
//! its cell holds; a removed cell, or a value that does not parse as an
//! integer, leaves the point absent. A raw diff becomes a point diff at the
//! same version only when the point value actually changes, so the projected
//! chain never carries a redundant diff either.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use serde::Serialize;

use crate::{
  Error, Result,
  chain::DiffEntry,
  period::{Epiweek, season_week_to_epiweek},
  snapshot::CellKey,
  version::Version,
};

/// Human-legible identity of one point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PointKey {
  pub location: String,
  pub epiweek:  Epiweek,
}

/// A materialised point projection.
pub type PointTable = BTreeMap<PointKey, i64>;

/// One projected diff. `L` is the location representation: a string at the
/// boundary, an interned id inside a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointDiff<L = String> {
  pub version:   Version,
  pub location:  L,
  pub epiweek:   Epiweek,
  /// `None` marks the point as removed.
  pub new_value: Option<i64>,
}

/// The point value a raw cell value stands for.
pub fn point_value(raw: Option<&str>) -> Option<i64> {
  raw.and_then(|s| s.trim().parse().ok())
}

/// Why a periodic-looking raw diff did not project cleanly.
#[derive(Debug)]
pub enum Skipped {
  /// The week names no real date in the season.
  InvalidPeriod(Error),
  /// The value is not an integer. The point reads as absent.
  NotInteger(String),
}

impl fmt::Display for Skipped {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Skipped::InvalidPeriod(e) => write!(f, "{e}"),
      Skipped::NotInteger(raw) => write!(f, "value {raw:?} is not an integer"),
    }
  }
}

// ─── Projection ──────────────────────────────────────────────────────────────

/// Point diffs accumulated from a batch of raw diffs.
///
/// Both the in-memory reference path ([`project`]) and storage backends
/// feed raw diffs through [`Projection::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection<L = String> {
  pub diffs:   Vec<PointDiff<L>>,
  /// Periodic-looking raw diffs whose week or value could not be read.
  pub skipped: usize,
  seen:        BTreeSet<(Version, L, Epiweek)>,
}

impl<L> Default for Projection<L> {
  fn default() -> Self {
    Self { diffs: Vec::new(), skipped: 0, seen: BTreeSet::new() }
  }
}

impl<L: Ord + Clone + fmt::Display> Projection<L> {
  pub fn new() -> Self { Self::default() }

  /// Project the raw diff of one cell at `version`. `old_value` is the
  /// cell's raw value just before `version`.
  ///
  /// Two raw cells landing on the same point at the same version (e.g.
  /// seasons spelled `2012-13` and `2012-2013`) violate the one-to-one
  /// mapping and are reported as [`Error::ChainIntegrity`].
  pub fn push(
    &mut self,
    version: Version,
    measurement_type: &str,
    location: L,
    week: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
  ) -> Result<Option<Skipped>> {
    let epiweek = match season_week_to_epiweek(measurement_type, week) {
      Ok(Some(epiweek)) => epiweek,
      Ok(None) => return Ok(None),
      Err(e) => {
        self.skipped += 1;
        return Ok(Some(Skipped::InvalidPeriod(e)));
      }
    };

    if !self.seen.insert((version, location.clone(), epiweek)) {
      return Err(Error::ChainIntegrity(format!(
        "two cells project onto {location}/{epiweek} at {version}"
      )));
    }

    let new_point = point_value(new_value);
    let skipped = match (new_value, new_point) {
      (Some(raw), None) => {
        self.skipped += 1;
        Some(Skipped::NotInteger(raw.to_owned()))
      }
      _ => None,
    };

    if point_value(old_value) != new_point {
      self.diffs.push(PointDiff { version, location, epiweek, new_value: new_point });
    }
    Ok(skipped)
  }
}

/// Project a raw diff log held in memory.
///
/// `entries` must list each cell's diffs with versions ascending, as
/// [`DiffChain::entries`](crate::chain::DiffChain::entries) does. Together
/// with [`reconstruct_points`] this is the reference model backends are
/// tested against.
pub fn project<'a, I>(entries: I) -> Result<Projection>
where
  I: IntoIterator<Item = &'a DiffEntry>,
{
  let mut projection = Projection::new();
  let mut last: BTreeMap<&CellKey, Option<&str>> = BTreeMap::new();

  for entry in entries {
    let new_value = entry.new_value.as_deref();
    let old_value = last.insert(&entry.cell, new_value).flatten();
    projection.push(
      entry.version,
      &entry.cell.measurement_type,
      entry.cell.location.clone(),
      &entry.cell.week,
      old_value,
      new_value,
    )?;
  }
  Ok(projection)
}

/// First point diff that repeats its predecessor's value (or removes a point
/// that never existed), if any.
///
/// `diffs` must be grouped by point with versions ascending.
pub fn find_redundant_points<L: PartialEq>(diffs: &[PointDiff<L>]) -> Option<&PointDiff<L>> {
  let mut prior: Option<&PointDiff<L>> = None;
  for diff in diffs {
    let redundant = match prior {
      Some(p) if p.location == diff.location && p.epiweek == diff.epiweek => {
        p.new_value == diff.new_value
      }
      _ => diff.new_value.is_none(),
    };
    if redundant {
      return Some(diff);
    }
    prior = Some(diff);
  }
  None
}

/// Replay point diffs up to `as_of`, latest diff per point winning.
pub fn reconstruct_points(diffs: &[PointDiff], as_of: &Version) -> PointTable {
  let mut latest: BTreeMap<PointKey, (Version, Option<i64>)> = BTreeMap::new();
  for diff in diffs.iter().filter(|d| d.version <= *as_of) {
    let key = PointKey {
      location: diff.location.clone(),
      epiweek:  diff.epiweek,
    };
    match latest.get(&key) {
      Some((seen, _)) if *seen > diff.version => {}
      _ => {
        latest.insert(key, (diff.version, diff.new_value));
      }
    }
  }
  latest
    .into_iter()
    .filter_map(|(key, (_, value))| value.map(|v| (key, v)))
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::{chain::DiffChain, snapshot::Snapshot};

  fn v(day: u32) -> Version {
    let date = NaiveDate::from_ymd_opt(2013, 3, day).unwrap();
    Version::new(date, date.and_hms_opt(8, 0, 0).unwrap())
  }

  fn key(yyyyww: i64) -> PointKey {
    PointKey {
      location: "AL".into(),
      epiweek:  Epiweek::from_yyyyww(yyyyww).unwrap(),
    }
  }

  fn record(chain: &mut DiffChain, version: Version, cells: &[(&str, &str, &str)]) {
    let mut s = Snapshot::new(version);
    for (mt, week, value) in cells {
      s.insert(CellKey::new(*mt, "AL", *week), *value).unwrap();
    }
    chain.record(&s).unwrap();
  }

  #[test]
  fn non_season_columns_are_not_projected() {
    let mut projection = Projection::<i64>::new();
    let skipped = projection.push(v(1), "Week", 1, "08-01", None, Some("4")).unwrap();
    assert!(skipped.is_none());
    assert!(projection.diffs.is_empty());
  }

  #[test]
  fn tombstones_project_to_tombstones() {
    let mut projection = Projection::new();
    projection
      .push(v(1), "2012-13", "AL".to_string(), "08-01", Some("3"), None)
      .unwrap();
    assert_eq!(projection.diffs.len(), 1);
    assert_eq!(projection.diffs[0].new_value, None);
    assert_eq!(projection.diffs[0].epiweek.to_yyyyww(), 201231);
  }

  #[test]
  fn impossible_dates_are_skipped() {
    let mut projection = Projection::new();
    let skipped = projection
      .push(v(1), "2012-13", "AL".to_string(), "02-30", None, Some("1"))
      .unwrap();
    assert!(matches!(skipped, Some(Skipped::InvalidPeriod(_))));
    assert_eq!(projection.skipped, 1);
    assert!(projection.diffs.is_empty());
  }

  #[test]
  fn projection_follows_the_raw_chain() {
    let mut chain = DiffChain::new();
    record(&mut chain, v(1), &[
      ("2012-13", "08-01", "4"),
      ("2012-13", "08-08", "x"),
      ("Notes", "08-01", "ignored"),
    ]);
    record(&mut chain, v(2), &[("2012-13", "08-08", "6")]);

    let projection = project(&chain.entries()).unwrap();
    assert_eq!(projection.skipped, 1);

    let at_v1 = reconstruct_points(&projection.diffs, &v(1));
    assert_eq!(at_v1, PointTable::from([(key(201231), 4)]));

    let at_v2 = reconstruct_points(&projection.diffs, &v(2));
    assert_eq!(at_v2, PointTable::from([(key(201232), 6)]));
  }

  #[test]
  fn non_integer_value_hides_the_point() {
    let mut chain = DiffChain::new();
    record(&mut chain, v(1), &[("2012-13", "08-01", "4")]);
    record(&mut chain, v(2), &[("2012-13", "08-01", "n/a")]);
    record(&mut chain, v(3), &[("2012-13", "08-01", "4")]);

    let projection = project(&chain.entries()).unwrap();
    assert_eq!(projection.skipped, 1);
    assert_eq!(
      projection.diffs.iter().map(|d| d.new_value).collect::<Vec<_>>(),
      vec![Some(4), None, Some(4)]
    );
    assert!(find_redundant_points(&projection.diffs).is_none());

    assert_eq!(reconstruct_points(&projection.diffs, &v(1)), PointTable::from([(key(201231), 4)]));
    assert!(reconstruct_points(&projection.diffs, &v(2)).is_empty());
    assert_eq!(reconstruct_points(&projection.diffs, &v(3)), PointTable::from([(key(201231), 4)]));
  }

  #[test]
  fn unreadable_values_in_a_row_emit_nothing_new() {
    let mut chain = DiffChain::new();
    record(&mut chain, v(1), &[("2012-13", "08-01", "n/a")]);
    record(&mut chain, v(2), &[("2012-13", "08-01", "pending")]);
    record(&mut chain, v(3), &[("2012-13", "08-01", " 7 ")]);

    let projection = project(&chain.entries()).unwrap();
    assert_eq!(projection.skipped, 2);
    assert_eq!(projection.diffs.len(), 1);
    assert_eq!(projection.diffs[0].version, v(3));
    assert_eq!(projection.diffs[0].new_value, Some(7));
    assert!(find_redundant_points(&projection.diffs).is_none());
  }

  #[test]
  fn redundant_point_diffs_are_found() {
    let diff = |day, value| PointDiff {
      version:   v(day),
      location:  "AL".to_string(),
      epiweek:   Epiweek::new(2012, 31).unwrap(),
      new_value: value,
    };
    assert!(find_redundant_points(&[diff(1, Some(4)), diff(2, None)]).is_none());
    let repeated = [diff(1, Some(4)), diff(2, Some(4))];
    assert_eq!(find_redundant_points(&repeated), Some(&repeated[1]));
    let orphan = [diff(1, None)];
    assert_eq!(find_redundant_points(&orphan), Some(&orphan[0]));
  }

  #[test]
  fn colliding_points_are_integrity_errors() {
    let mut chain = DiffChain::new();
    record(&mut chain, v(1), &[("2012-13", "08-01", "4"), ("2012-2013", "08-01", "4")]);
    assert!(matches!(project(&chain.entries()), Err(Error::ChainIntegrity(_))));
  }
}
