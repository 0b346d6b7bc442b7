//! [`SqliteStore`]: the SQLite implementation of [`DiffStore`].

use std::{path::Path, time::Duration};

use chrono::NaiveDate;
use tracing::info;

use revtab_core::{
  chain::{CellDiff, DiffEntry},
  period::Epiweek,
  point::{PointDiff, PointTable},
  snapshot::{CellKey, Snapshot, Table},
  store::{DiffStore, ProjectionReport, RecordReport},
  version::Version,
};

use crate::{
  Result,
  encode::{RawDiff, RawPoint, RawPointDiff, RawVersion, encode_release_date},
  ingest, ledger,
  pool::{self, Pool},
  projection,
  schema::{DROP_ALL, SCHEMA},
  state,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Connection settings, passed in explicitly at open time.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// How long a writer waits for another writer's transaction before the
  /// operation fails with a retryable conflict.
  pub busy_timeout: Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self { busy_timeout: Duration::from_secs(5) }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A revtab diff store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted and all
/// clones share its single database thread.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default options.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, StoreOptions::default()).await
  }

  pub async fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init(options).await?;
    Ok(store)
  }

  /// Open an in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init(StoreOptions::default()).await?;
    Ok(store)
  }

  async fn init(&self, options: StoreOptions) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(options.busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Create any missing tables. Needed only after [`Self::drop_all`].
  pub async fn ensure_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Drop every table. The store is empty (and unusable until
  /// [`Self::ensure_schema`]) afterwards.
  pub async fn drop_all(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(DROP_ALL)?;
        Ok(())
      })
      .await?;
    info!("dropped all tables");
    Ok(())
  }

  // ── Pools ─────────────────────────────────────────────────────────────────

  /// Intern `text` in `pool`, returning its stable id.
  pub async fn intern(&self, pool: Pool, text: impl Into<String>) -> Result<i64> {
    let text = text.into();
    let id = self
      .conn
      .call(move |conn| Ok(pool::intern(conn, pool, &text)?))
      .await?;
    Ok(id)
  }

  /// Look up the id of `text` without allocating one.
  pub async fn lookup(&self, pool: Pool, text: impl Into<String>) -> Result<Option<i64>> {
    let text = text.into();
    let id = self
      .conn
      .call(move |conn| Ok(pool::lookup(conn, pool, &text)?))
      .await?;
    Ok(id)
  }

  /// The text an id was allocated for.
  pub async fn resolve(&self, pool: Pool, id: i64) -> Result<Option<String>> {
    let text = self
      .conn
      .call(move |conn| Ok(pool::resolve(conn, pool, id)?))
      .await?;
    Ok(text)
  }

  async fn neighbour(
    &self,
    version: Version,
    find: fn(&rusqlite::Connection, &RawVersion) -> rusqlite::Result<Option<RawVersion>>,
  ) -> Result<Option<Version>> {
    let raw_version = RawVersion::encode(version)?;
    let raw = self
      .conn
      .call(move |conn| Ok(find(conn, &raw_version)?))
      .await?;
    raw.map(|r| r.decode()).transpose()
  }
}

// ─── DiffStore impl ──────────────────────────────────────────────────────────

impl DiffStore for SqliteStore {
  type Error = crate::Error;

  // ── Ingestion ─────────────────────────────────────────────────────────────

  async fn record_snapshot(&self, snapshot: Snapshot) -> Result<RecordReport> {
    let report = self
      .conn
      .call(move |conn| Ok(ingest::record_snapshot(conn, &snapshot)))
      .await??;

    info!(
      version = %report.version,
      forward_diffs = report.forward_diffs,
      repaired = ?report.repaired,
      "recorded snapshot"
    );
    Ok(report)
  }

  // ── Version ledger ────────────────────────────────────────────────────────

  async fn list_versions(&self) -> Result<Vec<Version>> {
    let raws = self
      .conn
      .call(|conn| Ok(ledger::list(conn)?))
      .await?;
    raws.iter().map(RawVersion::decode).collect()
  }

  async fn previous_version(&self, version: Version) -> Result<Option<Version>> {
    self.neighbour(version, ledger::previous).await
  }

  async fn next_version(&self, version: Version) -> Result<Option<Version>> {
    self.neighbour(version, ledger::next).await
  }

  async fn latest_version_for(&self, release_date: NaiveDate) -> Result<Option<Version>> {
    let date = encode_release_date(release_date);
    let raw = self
      .conn
      .call(move |conn| Ok(ledger::latest_for(conn, &date)?))
      .await?;
    raw.map(|r| r.decode()).transpose()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn reconstruct(&self, as_of: Version) -> Result<Table> {
    let raw_version = RawVersion::encode(as_of)?;
    let raws: Vec<RawDiff> = self
      .conn
      .call(move |conn| Ok(state::table_as_of(conn, &raw_version)?))
      .await?;

    raws
      .into_iter()
      .map(|raw| -> Result<(CellKey, String)> {
        let entry = raw.into_entry()?;
        // `table_as_of` filters tombstones; a missing value would be a bug.
        let value = entry.new_value.ok_or_else(|| {
          revtab_core::Error::ChainIntegrity(format!(
            "tombstone for {:?} in reconstructed table",
            entry.cell
          ))
        })?;
        Ok((entry.cell, value))
      })
      .collect()
  }

  async fn diffs_at(&self, version: Version) -> Result<Vec<CellDiff<CellKey>>> {
    let raw_version = RawVersion::encode(version)?;
    let raws: Vec<RawDiff> = self
      .conn
      .call(move |conn| Ok(state::resolved_diffs_at(conn, &raw_version)?))
      .await?;

    let mut diffs = raws
      .into_iter()
      .map(|raw| raw.into_entry().map(|e| (e.cell, e.new_value)))
      .collect::<Result<Vec<_>>>()?;
    diffs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(diffs)
  }

  async fn diff_log(&self) -> Result<Vec<DiffEntry>> {
    let raws: Vec<RawDiff> = self
      .conn
      .call(|conn| Ok(state::diff_log(conn)?))
      .await?;
    raws.into_iter().map(RawDiff::into_entry).collect()
  }

  // ── Point projection ──────────────────────────────────────────────────────

  async fn update_points(&self) -> Result<ProjectionReport> {
    let report = self
      .conn
      .call(|conn| Ok(projection::update_points(conn)))
      .await??;
    Ok(report)
  }

  async fn point(
    &self,
    location: &str,
    epiweek: Epiweek,
    as_of: Version,
  ) -> Result<Option<i64>> {
    let location = location.to_owned();
    let raw_version = RawVersion::encode(as_of)?;
    let value = self
      .conn
      .call(move |conn| {
        Ok(projection::point(conn, &location, epiweek.to_yyyyww(), &raw_version)?)
      })
      .await?;
    Ok(value)
  }

  async fn points_as_of(&self, as_of: Version) -> Result<PointTable> {
    let raw_version = RawVersion::encode(as_of)?;
    let raws: Vec<RawPoint> = self
      .conn
      .call(move |conn| Ok(projection::points_as_of(conn, &raw_version)?))
      .await?;
    raws.into_iter().map(RawPoint::into_point).collect()
  }

  async fn point_log(&self) -> Result<Vec<PointDiff>> {
    let raws: Vec<RawPointDiff> = self
      .conn
      .call(|conn| Ok(projection::point_log(conn)?))
      .await?;
    raws.into_iter().map(RawPointDiff::into_diff).collect()
  }
}
