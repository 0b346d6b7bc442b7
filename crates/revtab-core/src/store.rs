//! The `DiffStore` trait and its report types.
//!
//! The trait is implemented by storage backends (e.g. `revtab-store-sqlite`).
//! Higher layers (`revtab-cli`, a serving layer) depend on this abstraction,
//! not on any concrete backend. Keys and versions cross this boundary as
//! human-legible strings and dates, never as interned ids.

use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
  chain::{CellDiff, DiffEntry},
  period::Epiweek,
  point::{PointDiff, PointTable},
  snapshot::{CellKey, Snapshot, Table},
  version::Version,
};

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What a committed [`DiffStore::record_snapshot`] wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReport {
  pub version:        Version,
  /// Diff entries written at `version`.
  pub forward_diffs:  usize,
  /// The following version whose diff was recomputed, for out-of-order
  /// inserts.
  pub repaired:       Option<Version>,
  /// Diff entries written at `repaired` after the repair.
  pub repaired_diffs: usize,
}

/// What a [`DiffStore::update_points`] run processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionReport {
  /// Raw versions newly marked as projected.
  pub versions:    usize,
  pub point_diffs: usize,
  /// Periodic-looking raw diffs that could not be projected.
  pub skipped:     usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a versioned-table diff store backend.
///
/// Recording a snapshot is one atomic unit: its interned keys, ledger entry,
/// diff rows and any chain repair commit together or not at all.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DiffStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ingestion ─────────────────────────────────────────────────────────

  /// Persist the diff between `snapshot` and its predecessor, register its
  /// version, and repair the following version's diff if the snapshot
  /// lands before the most recent known version.
  fn record_snapshot(
    &self,
    snapshot: Snapshot,
  ) -> impl Future<Output = Result<RecordReport, Self::Error>> + Send + '_;

  // ── Version ledger ────────────────────────────────────────────────────

  /// All recorded versions, ascending.
  fn list_versions(
    &self,
  ) -> impl Future<Output = Result<Vec<Version>, Self::Error>> + Send + '_;

  /// Greatest recorded version strictly before `version`.
  fn previous_version(
    &self,
    version: Version,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  /// Least recorded version strictly after `version`.
  fn next_version(
    &self,
    version: Version,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  /// The version of `release_date` with the latest parse time.
  fn latest_version_for(
    &self,
    release_date: NaiveDate,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Materialise the table as of `as_of`. Tombstoned cells are absent.
  fn reconstruct(
    &self,
    as_of: Version,
  ) -> impl Future<Output = Result<Table, Self::Error>> + Send + '_;

  /// The diff stored at exactly `version`, ordered by cell.
  fn diffs_at(
    &self,
    version: Version,
  ) -> impl Future<Output = Result<Vec<CellDiff<CellKey>>, Self::Error>> + Send + '_;

  /// Every stored diff, grouped by cell with versions ascending.
  fn diff_log(
    &self,
  ) -> impl Future<Output = Result<Vec<DiffEntry>, Self::Error>> + Send + '_;

  // ── Point projection ──────────────────────────────────────────────────

  /// Project every committed raw version not yet projected. Idempotent.
  fn update_points(
    &self,
  ) -> impl Future<Output = Result<ProjectionReport, Self::Error>> + Send + '_;

  /// The projected value of one point as of `as_of`, if present.
  fn point<'a>(
    &'a self,
    location: &'a str,
    epiweek: Epiweek,
    as_of: Version,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  /// Materialise the whole point projection as of `as_of`.
  fn points_as_of(
    &self,
    as_of: Version,
  ) -> impl Future<Output = Result<PointTable, Self::Error>> + Send + '_;

  /// Every stored point diff, grouped by point with versions ascending.
  fn point_log(
    &self,
  ) -> impl Future<Output = Result<Vec<PointDiff>, Self::Error>> + Send + '_;
}
