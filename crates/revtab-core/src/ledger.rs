//! The version ledger: the ordered set of every recorded version.
//!
//! [`VersionLedger`] is the in-memory form used by
//! [`DiffChain`](crate::chain::DiffChain). Persistent backends keep the same
//! contract in a table keyed on the version pair.

use std::{collections::BTreeSet, ops::Bound};

use chrono::NaiveDate;

use crate::{Error, Result, version::Version};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionLedger {
  versions: BTreeSet<Version>,
}

impl VersionLedger {
  pub fn new() -> Self { Self::default() }

  /// Add `version` to the timeline. Never overwrites: an existing entry is
  /// reported as [`Error::DuplicateVersion`].
  pub fn register(&mut self, version: Version) -> Result<()> {
    if !self.versions.insert(version) {
      return Err(Error::DuplicateVersion(version));
    }
    Ok(())
  }

  pub fn contains(&self, version: &Version) -> bool {
    self.versions.contains(version)
  }

  /// All versions, ascending.
  pub fn list(&self) -> Vec<Version> { self.versions.iter().copied().collect() }

  /// Greatest recorded version strictly less than `version`.
  pub fn previous(&self, version: &Version) -> Option<Version> {
    self.versions.range(..*version).next_back().copied()
  }

  /// Least recorded version strictly greater than `version`.
  pub fn next(&self, version: &Version) -> Option<Version> {
    self
      .versions
      .range((Bound::Excluded(*version), Bound::Unbounded))
      .next()
      .copied()
  }

  /// The most recently parsed version of a given release.
  pub fn latest_for(&self, release_date: NaiveDate) -> Option<Version> {
    self
      .versions
      .iter()
      .rev()
      .find(|v| v.release_date() == release_date)
      .copied()
  }

  pub fn len(&self) -> usize { self.versions.len() }

  pub fn is_empty(&self) -> bool { self.versions.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(day: u32, hour: u32) -> Version {
    let date = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
    Version::new(date, date.and_hms_opt(hour, 0, 0).unwrap())
  }

  #[test]
  fn register_rejects_duplicates() {
    let mut ledger = VersionLedger::new();
    ledger.register(v(1, 0)).unwrap();
    let err = ledger.register(v(1, 0)).unwrap_err();
    assert!(matches!(err, Error::DuplicateVersion(d) if d == v(1, 0)));
    assert_eq!(ledger.len(), 1);
  }

  #[test]
  fn list_is_ascending_regardless_of_insertion_order() {
    let mut ledger = VersionLedger::new();
    for version in [v(3, 0), v(1, 0), v(2, 5), v(2, 1)] {
      ledger.register(version).unwrap();
    }
    assert_eq!(ledger.list(), vec![v(1, 0), v(2, 1), v(2, 5), v(3, 0)]);
  }

  #[test]
  fn previous_and_next_are_strict() {
    let mut ledger = VersionLedger::new();
    for version in [v(1, 0), v(3, 0), v(5, 0)] {
      ledger.register(version).unwrap();
    }
    assert_eq!(ledger.previous(&v(3, 0)), Some(v(1, 0)));
    assert_eq!(ledger.next(&v(3, 0)), Some(v(5, 0)));
    assert_eq!(ledger.previous(&v(2, 0)), Some(v(1, 0)));
    assert_eq!(ledger.next(&v(2, 0)), Some(v(3, 0)));
    assert_eq!(ledger.previous(&v(1, 0)), None);
    assert_eq!(ledger.next(&v(5, 0)), None);
  }

  #[test]
  fn latest_for_picks_latest_parse_of_release() {
    let mut ledger = VersionLedger::new();
    for version in [v(1, 2), v(1, 9), v(2, 0)] {
      ledger.register(version).unwrap();
    }
    assert_eq!(
      ledger.latest_for(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
      Some(v(1, 9))
    );
    assert_eq!(
      ledger.latest_for(NaiveDate::from_ymd_opt(2024, 5, 4).unwrap()),
      None
    );
  }
}
