//! The diff chain: per-cell change log between consecutive versions.
//!
//! Each cell's value over time is a step function: at any version it holds
//! the `new_value` of its latest diff at or before that version, and it is
//! absent when that diff is a tombstone or no diff exists yet. Two
//! consecutive diffs of one cell never carry the same value; a first diff is
//! never a tombstone.
//!
//! The algorithms here are generic over the cell key so that storage
//! backends can run them on interned ids while [`DiffChain`] runs them on
//! human-legible [`CellKey`]s.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use crate::{
  Error, Result,
  ledger::VersionLedger,
  snapshot::{CellKey, Snapshot, Table},
  version::Version,
};

/// One cell change: `Some(value)` for an added or revised value, `None` for
/// a removal (tombstone).
pub type CellDiff<K> = (K, Option<String>);

/// A reconstructed state keyed by `K`.
pub type State<K> = BTreeMap<K, String>;

/// A stored diff row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry<K = CellKey> {
  pub version:   Version,
  pub cell:      K,
  /// `None` marks the cell as removed from `version` on.
  pub new_value: Option<String>,
}

// ─── Diff computation ────────────────────────────────────────────────────────

/// The minimal diff that turns `from` into `to`: changed or added cells carry
/// their new value, cells missing from `to` get a tombstone, unchanged cells
/// emit nothing. Sorted by cell.
pub fn forward_diff<K: Ord + Clone>(
  from: &State<K>,
  to: &State<K>,
) -> Vec<CellDiff<K>> {
  let mut diff: Vec<CellDiff<K>> = to
    .iter()
    .filter(|(cell, value)| from.get(*cell) != Some(*value))
    .map(|(cell, value)| (cell.clone(), Some(value.clone())))
    .collect();

  diff.extend(
    from
      .keys()
      .filter(|cell| !to.contains_key(*cell))
      .map(|cell| (cell.clone(), None)),
  );

  diff.sort_by(|a, b| a.0.cmp(&b.0));
  diff
}

/// Check that `link`, the stored diff at `version`, is a valid forward diff
/// from `previous`, the state of its predecessor.
pub fn verify_link<K: Ord + fmt::Debug>(
  previous: &State<K>,
  version: Version,
  link: &[CellDiff<K>],
) -> Result<()> {
  for (cell, new_value) in link {
    match (previous.get(cell), new_value) {
      (Some(old), Some(new)) if old == new => {
        return Err(Error::ChainIntegrity(format!(
          "diff at {version} re-affirms the unchanged value of {cell:?}"
        )));
      }
      (None, None) => {
        return Err(Error::ChainIntegrity(format!(
          "diff at {version} removes {cell:?}, which its predecessor does not hold"
        )));
      }
      _ => {}
    }
  }
  Ok(())
}

// ─── Insertion planning ──────────────────────────────────────────────────────

/// Replacement diff for the version right after an out-of-order insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRepair<K = CellKey> {
  pub next_version: Version,
  /// Replaces every stored diff at `next_version`.
  pub diff:         Vec<CellDiff<K>>,
}

/// Everything a backend must write to splice one snapshot into the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPatch<K = CellKey> {
  pub version: Version,
  pub forward: Vec<CellDiff<K>>,
  pub repair:  Option<LinkRepair<K>>,
}

impl<K> DiffPatch<K> {
  pub fn repaired_version(&self) -> Option<Version> {
    self.repair.as_ref().map(|r| r.next_version)
  }
}

/// Plan the writes for inserting `inserted` at `version`.
///
/// `previous` is the state immediately before `version` under the current
/// chain. `next` is the following recorded version with its state under the
/// current chain, if any; its diff is recomputed relative to `inserted`.
pub fn plan_insertion<K: Ord + Clone>(
  version: Version,
  previous: &State<K>,
  inserted: &State<K>,
  next: Option<(Version, &State<K>)>,
) -> Result<DiffPatch<K>> {
  let repair = match next {
    Some((next_version, _)) if next_version <= version => {
      return Err(Error::ChainIntegrity(format!(
        "version {next_version} does not follow {version}"
      )));
    }
    Some((next_version, next_state)) => Some(LinkRepair {
      next_version,
      diff: forward_diff(inserted, next_state),
    }),
    None => None,
  };

  Ok(DiffPatch {
    version,
    forward: forward_diff(previous, inserted),
    repair,
  })
}

/// Compute the patch that splices `inserted` at `version` into `old_chain`,
/// repairing the following link when the insertion is out of order.
pub fn repair(
  old_chain: &DiffChain,
  version: Version,
  inserted: &Table,
) -> Result<DiffPatch> {
  if old_chain.ledger.contains(&version) {
    return Err(Error::DuplicateVersion(version));
  }
  if !old_chain.diffs_at(&version).is_empty() {
    return Err(Error::ChainIntegrity(format!(
      "diffs exist at unrecorded version {version}"
    )));
  }

  let previous = old_chain.reconstruct(&version);
  let next = match old_chain.ledger.next(&version) {
    Some(next_version) => {
      verify_link(&previous, next_version, &old_chain.diffs_at(&next_version))?;
      Some((next_version, old_chain.reconstruct(&next_version)))
    }
    None => None,
  };

  plan_insertion(
    version,
    &previous,
    inserted,
    next.as_ref().map(|(v, state)| (*v, state)),
  )
}

/// First entry that breaks the no-redundant-diff rule, if any.
///
/// `entries` must be grouped by cell with versions ascending within a cell.
pub fn find_redundant<K: PartialEq>(entries: &[DiffEntry<K>]) -> Option<&DiffEntry<K>> {
  let mut prior: Option<&DiffEntry<K>> = None;
  for entry in entries {
    let redundant = match prior {
      Some(p) if p.cell == entry.cell => p.new_value == entry.new_value,
      _ => entry.new_value.is_none(),
    };
    if redundant {
      return Some(entry);
    }
    prior = Some(entry);
  }
  None
}

// ─── In-memory chain ─────────────────────────────────────────────────────────

/// A complete diff chain held in memory.
///
/// Serves as the reference model for storage backends and as a lightweight
/// store for tools that never persist.
#[derive(Debug, Clone, Default)]
pub struct DiffChain {
  ledger: VersionLedger,
  cells:  BTreeMap<CellKey, BTreeMap<Version, Option<String>>>,
}

impl DiffChain {
  pub fn new() -> Self { Self::default() }

  pub fn ledger(&self) -> &VersionLedger { &self.ledger }

  /// Record `snapshot`, repairing the following link if needed.
  pub fn record(&mut self, snapshot: &Snapshot) -> Result<DiffPatch> {
    let patch = repair(self, snapshot.version(), snapshot.cells())?;
    self.apply(&patch)?;
    Ok(patch)
  }

  /// Write a planned patch. Nothing is changed if the patch is rejected.
  pub fn apply(&mut self, patch: &DiffPatch) -> Result<()> {
    if let Some(next_version) = patch.repaired_version()
      && !self.ledger.contains(&next_version)
    {
      return Err(Error::UnknownVersion(next_version));
    }
    self.ledger.register(patch.version)?;

    for (cell, new_value) in &patch.forward {
      self
        .cells
        .entry(cell.clone())
        .or_default()
        .insert(patch.version, new_value.clone());
    }

    if let Some(repair) = &patch.repair {
      for history in self.cells.values_mut() {
        history.remove(&repair.next_version);
      }
      self.cells.retain(|_, history| !history.is_empty());
      for (cell, new_value) in &repair.diff {
        self
          .cells
          .entry(cell.clone())
          .or_default()
          .insert(repair.next_version, new_value.clone());
      }
    }
    Ok(())
  }

  /// The table as of `as_of`: per cell, the latest diff at or before it,
  /// with tombstoned cells left out.
  pub fn reconstruct(&self, as_of: &Version) -> Table {
    self
      .cells
      .iter()
      .filter_map(|(cell, history)| {
        let (_, value) = history.range(..=*as_of).next_back()?;
        value.clone().map(|v| (cell.clone(), v))
      })
      .collect()
  }

  /// The diff stored at exactly `version`.
  pub fn diffs_at(&self, version: &Version) -> Vec<CellDiff<CellKey>> {
    self
      .cells
      .iter()
      .filter_map(|(cell, history)| {
        history.get(version).map(|v| (cell.clone(), v.clone()))
      })
      .collect()
  }

  /// Every stored diff, cell-major and version-ascending.
  pub fn entries(&self) -> Vec<DiffEntry> {
    self
      .cells
      .iter()
      .flat_map(|(cell, history)| {
        history.iter().map(move |(version, new_value)| DiffEntry {
          version:   *version,
          cell:      cell.clone(),
          new_value: new_value.clone(),
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn v(day: u32) -> Version {
    let date = NaiveDate::from_ymd_opt(2024, 2, day).unwrap();
    Version::new(date, date.and_hms_opt(9, 30, 0).unwrap())
  }

  fn cell(week: &str) -> CellKey { CellKey::new("A", "B", week) }

  fn snapshot(version: Version, cells: &[(&str, &str)]) -> Snapshot {
    let mut s = Snapshot::new(version);
    for (week, value) in cells {
      s.insert(cell(week), *value).unwrap();
    }
    s
  }

  fn table(cells: &[(&str, &str)]) -> Table {
    cells
      .iter()
      .map(|(week, value)| (cell(week), value.to_string()))
      .collect()
  }

  // ─── forward_diff ──────────────────────────────────────────────────────

  #[test]
  fn forward_diff_emits_changes_additions_and_tombstones() {
    let from = table(&[("1", "5"), ("2", "6"), ("3", "7")]);
    let to = table(&[("1", "5"), ("2", "8"), ("4", "9")]);
    assert_eq!(forward_diff(&from, &to), vec![
      (cell("2"), Some("8".into())),
      (cell("3"), None),
      (cell("4"), Some("9".into())),
    ]);
  }

  #[test]
  fn forward_diff_of_identical_states_is_empty() {
    let state = table(&[("1", "5"), ("2", "6")]);
    assert!(forward_diff(&state, &state).is_empty());
  }

  // ─── Chain behaviour ───────────────────────────────────────────────────

  #[test]
  fn in_order_round_trip() {
    let snapshots = [
      snapshot(v(1), &[("1", "5"), ("2", "6")]),
      snapshot(v(3), &[("1", "5"), ("3", "1")]),
      snapshot(v(5), &[]),
      snapshot(v(7), &[("2", "6")]),
    ];
    let mut chain = DiffChain::new();
    for s in &snapshots {
      chain.record(s).unwrap();
    }
    for s in &snapshots {
      assert_eq!(&chain.reconstruct(&s.version()), s.cells());
    }
    // Between versions the earlier snapshot still holds.
    assert_eq!(&chain.reconstruct(&v(4)), snapshots[1].cells());
    assert!(find_redundant(&chain.entries()).is_none());
  }

  #[test]
  fn before_first_version_nothing_exists() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(10), &[("1", "5")])).unwrap();
    assert!(chain.reconstruct(&v(9)).is_empty());
  }

  #[test]
  fn identical_snapshot_adds_no_diffs_but_registers_version() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(1), &[("1", "5")])).unwrap();
    let patch = chain.record(&snapshot(v(2), &[("1", "5")])).unwrap();
    assert!(patch.forward.is_empty());
    assert!(chain.ledger().contains(&v(2)));
    assert_eq!(chain.entries().len(), 1);
  }

  #[test]
  fn duplicate_version_leaves_chain_untouched() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(1), &[("1", "5")])).unwrap();
    let err = chain.record(&snapshot(v(1), &[("1", "9")])).unwrap_err();
    assert!(matches!(err, Error::DuplicateVersion(_)));
    assert_eq!(chain.reconstruct(&v(1)), table(&[("1", "5")]));
    assert_eq!(chain.ledger().len(), 1);
  }

  #[test]
  fn out_of_order_insert_preserves_later_state() {
    let v1 = snapshot(v(1), &[("1", "5"), ("2", "6")]);
    let v3 = snapshot(v(3), &[("1", "7"), ("3", "8")]);
    let v2 = snapshot(v(2), &[("2", "6"), ("3", "8"), ("4", "1")]);

    let mut chain = DiffChain::new();
    chain.record(&v1).unwrap();
    chain.record(&v3).unwrap();
    let patch = chain.record(&v2).unwrap();

    assert_eq!(patch.repaired_version(), Some(v(3)));
    assert_eq!(&chain.reconstruct(&v(1)), v1.cells());
    assert_eq!(&chain.reconstruct(&v(2)), v2.cells());
    assert_eq!(&chain.reconstruct(&v(3)), v3.cells());
    assert!(find_redundant(&chain.entries()).is_none());
  }

  #[test]
  fn out_of_order_matches_in_order_chain() {
    let snaps = [
      snapshot(v(1), &[("1", "5")]),
      snapshot(v(2), &[("1", "6"), ("2", "1")]),
      snapshot(v(3), &[("2", "1")]),
      snapshot(v(4), &[("1", "6"), ("2", "2")]),
    ];

    let mut in_order = DiffChain::new();
    for s in &snaps {
      in_order.record(s).unwrap();
    }

    let mut shuffled = DiffChain::new();
    for idx in [3, 0, 2, 1] {
      shuffled.record(&snaps[idx]).unwrap();
    }

    assert_eq!(in_order.entries(), shuffled.entries());
  }

  #[test]
  fn concrete_scenario_insert_before_first() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(2), &[("1", "5")])).unwrap();
    chain.record(&snapshot(v(3), &[("1", "7")])).unwrap();
    assert_eq!(chain.reconstruct(&v(2)), table(&[("1", "5")]));
    assert_eq!(chain.reconstruct(&v(3)), table(&[("1", "7")]));

    chain.record(&snapshot(v(1), &[("1", "3")])).unwrap();
    assert_eq!(chain.reconstruct(&v(1)), table(&[("1", "3")]));
    assert_eq!(chain.reconstruct(&v(2)), table(&[("1", "5")]));
    assert_eq!(chain.diffs_at(&v(2)), vec![(cell("1"), Some("5".into()))]);
  }

  #[test]
  fn repair_drops_diffs_made_redundant_by_insertion() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(1), &[])).unwrap();
    chain.record(&snapshot(v(3), &[("1", "5")])).unwrap();
    // The inserted version already holds v3's value, so v3's diff empties.
    chain.record(&snapshot(v(2), &[("1", "5")])).unwrap();
    assert!(chain.diffs_at(&v(3)).is_empty());
    assert_eq!(chain.reconstruct(&v(3)), table(&[("1", "5")]));
  }

  #[test]
  fn repair_adds_tombstones_for_cells_only_the_insert_holds() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(1), &[("1", "5")])).unwrap();
    chain.record(&snapshot(v(3), &[("1", "5")])).unwrap();
    chain.record(&snapshot(v(2), &[("1", "5"), ("9", "2")])).unwrap();
    assert_eq!(chain.diffs_at(&v(3)), vec![(cell("9"), None)]);
    assert_eq!(chain.reconstruct(&v(3)), table(&[("1", "5")]));
  }

  #[test]
  fn repair_is_pure() {
    let mut chain = DiffChain::new();
    chain.record(&snapshot(v(1), &[("1", "5")])).unwrap();
    chain.record(&snapshot(v(3), &[("1", "7")])).unwrap();
    let before = chain.entries();

    let patch = repair(&chain, v(2), &table(&[("1", "6")])).unwrap();
    assert_eq!(patch.forward, vec![(cell("1"), Some("6".into()))]);
    assert_eq!(
      patch.repair,
      Some(LinkRepair {
        next_version: v(3),
        diff:         vec![(cell("1"), Some("7".into()))],
      })
    );
    assert_eq!(chain.entries(), before);
  }

  // ─── Integrity ─────────────────────────────────────────────────────────

  #[test]
  fn verify_link_rejects_reaffirmed_values() {
    let previous = table(&[("1", "5")]);
    let err =
      verify_link(&previous, v(2), &[(cell("1"), Some("5".into()))]).unwrap_err();
    assert!(matches!(err, Error::ChainIntegrity(_)));
  }

  #[test]
  fn verify_link_rejects_tombstone_of_absent_cell() {
    let err = verify_link(&table(&[]), v(2), &[(cell("1"), None)]).unwrap_err();
    assert!(matches!(err, Error::ChainIntegrity(_)));
  }

  #[test]
  fn plan_rejects_next_version_not_after_insert() {
    let state = table(&[]);
    let err = plan_insertion(v(3), &state, &state, Some((v(2), &state))).unwrap_err();
    assert!(matches!(err, Error::ChainIntegrity(_)));
  }

  #[test]
  fn find_redundant_flags_repeats_and_leading_tombstones() {
    let entry = |day, week: &str, value: Option<&str>| DiffEntry {
      version:   v(day),
      cell:      cell(week),
      new_value: value.map(str::to_owned),
    };
    assert!(find_redundant(&[entry(1, "1", Some("5")), entry(2, "1", None)]).is_none());
    assert_eq!(
      find_redundant(&[entry(1, "1", Some("5")), entry(2, "1", Some("5"))]),
      Some(&entry(2, "1", Some("5")))
    );
    assert_eq!(
      find_redundant(&[entry(1, "1", Some("5")), entry(2, "2", None)]),
      Some(&entry(2, "2", None))
    );
  }

  #[test]
  fn no_redundant_diffs_over_many_orderings() {
    // Deterministic pseudo-random snapshots and insertion orders.
    let mut seed: u64 = 0x5eed;
    let mut next = move |bound: u64| {
      seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
      (seed >> 33) % bound
    };

    for _round in 0..20 {
      let snaps: Vec<Snapshot> = (1..=8)
        .map(|day| {
          let mut s = Snapshot::new(v(day));
          for week in 0..4 {
            if next(3) != 0 {
              s.insert(cell(&week.to_string()), next(3).to_string()).unwrap();
            }
          }
          s
        })
        .collect();

      let mut order: Vec<usize> = (0..snaps.len()).collect();
      for i in (1..order.len()).rev() {
        order.swap(i, next(i as u64 + 1) as usize);
      }

      let mut chain = DiffChain::new();
      for idx in order {
        chain.record(&snaps[idx]).unwrap();
      }
      assert!(find_redundant(&chain.entries()).is_none());
      for s in &snaps {
        assert_eq!(&chain.reconstruct(&s.version()), s.cells());
      }
    }
  }
}
