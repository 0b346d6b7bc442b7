//! `revtab`: operator tool for a versioned-table diff store.
//!
//! # Usage
//!
//! ```
//! revtab init
//! revtab record snapshots/2014-10-03.json
//! revtab reconstruct 2014-10-03
//! revtab project
//! revtab points 2014-10-03 2014-10-03T12:00:00
//! revtab audit
//! ```

mod config;
mod input;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, bail};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use revtab_core::{
  chain::find_redundant, point::find_redundant_points, snapshot::SnapshotRow,
  store::DiffStore, version::Version,
};
use revtab_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::CliConfig, input::SnapshotFile};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Versioned-table diff store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "revtab.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the store and its tables.
  Init,
  /// Record one snapshot read from a JSON file.
  Record { file: PathBuf },
  /// List every recorded version, oldest first.
  Versions,
  /// Print the table as of a version.
  Reconstruct {
    release_date: NaiveDate,
    /// Defaults to the latest parse of `release_date`.
    parse_time:   Option<NaiveDateTime>,
  },
  /// Project new raw versions onto the point table.
  Project,
  /// Print the point table as of a version.
  Points {
    release_date: NaiveDate,
    parse_time:   Option<NaiveDateTime>,
  },
  /// Check both diff logs for redundant diffs.
  Audit,
  /// Drop every table.
  Drop {
    #[arg(long)]
    yes: bool,
  },
}

/// One line of `revtab points` output.
#[derive(Serialize)]
struct PointRow {
  location: String,
  epiweek:  i64,
  value:    i64,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  let store_path = cfg.store_path();
  let store = SqliteStore::open_with(&store_path, cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Init => {
      info!(path = ?store_path, "store ready");
    }
    Command::Record { file } => {
      let snapshot = SnapshotFile::read(&file)?
        .into_snapshot()
        .with_context(|| format!("invalid snapshot in {}", file.display()))?;
      record(&store, snapshot, cfg.conflict_retries).await?;
    }
    Command::Versions => {
      for version in store.list_versions().await? {
        println!("{version}");
      }
    }
    Command::Reconstruct { release_date, parse_time } => {
      let version = resolve_version(&store, release_date, parse_time).await?;
      let table = match store.reconstruct(version).await {
        Ok(table) => table,
        Err(e) => no_data(e)?,
      };
      let rows: Vec<SnapshotRow> = table
        .into_iter()
        .map(|(cell, value)| SnapshotRow {
          measurement_type: cell.measurement_type,
          location: cell.location,
          week: cell.week,
          value,
        })
        .collect();
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Command::Project => {
      let report = store.update_points().await?;
      println!(
        "projected {} version(s): {} point diff(s), {} skipped",
        report.versions, report.point_diffs, report.skipped
      );
    }
    Command::Points { release_date, parse_time } => {
      let version = resolve_version(&store, release_date, parse_time).await?;
      let points = match store.points_as_of(version).await {
        Ok(points) => points,
        Err(e) => no_data(e)?,
      };
      let rows: Vec<PointRow> = points
        .into_iter()
        .map(|(key, value)| PointRow {
          location: key.location,
          epiweek: key.epiweek.to_yyyyww(),
          value,
        })
        .collect();
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Command::Audit => {
      let diffs = store.diff_log().await?;
      if let Some(entry) = find_redundant(&diffs) {
        bail!(
          "redundant raw diff at {}: {}/{}/{} = {:?}",
          entry.version,
          entry.cell.measurement_type,
          entry.cell.location,
          entry.cell.week,
          entry.new_value
        );
      }
      let points = store.point_log().await?;
      if let Some(diff) = find_redundant_points(&points) {
        bail!(
          "redundant point diff at {}: {}/{} = {:?}",
          diff.version,
          diff.location,
          diff.epiweek,
          diff.new_value
        );
      }
      println!("{} raw diff(s), {} point diff(s), none redundant", diffs.len(), points.len());
    }
    Command::Drop { yes } => {
      if !yes {
        bail!("refusing to drop every table without --yes");
      }
      store.drop_all().await?;
      info!(path = ?store_path, "dropped all tables");
    }
  }

  Ok(())
}

// ─── Commands ─────────────────────────────────────────────────────────────────

/// Record `snapshot`, retrying the whole transaction on conflicts.
async fn record(
  store: &SqliteStore,
  snapshot: revtab_core::snapshot::Snapshot,
  retries: u32,
) -> anyhow::Result<()> {
  let version = snapshot.version();
  let mut attempt = 0;
  loop {
    match store.record_snapshot(snapshot.clone()).await {
      Ok(report) => {
        match report.repaired {
          Some(next) => println!(
            "recorded {version}: {} diff(s), repaired {next} ({} diff(s))",
            report.forward_diffs, report.repaired_diffs
          ),
          None => println!("recorded {version}: {} diff(s)", report.forward_diffs),
        }
        return Ok(());
      }
      Err(e) if e.is_duplicate_version() => {
        bail!("version {version} is already recorded");
      }
      Err(e) if e.is_retryable() && attempt < retries => {
        attempt += 1;
        warn!(%version, attempt, error = %e, "transaction conflict, retrying");
        tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
      }
      Err(e) => return Err(e).with_context(|| format!("failed to record {version}")),
    }
  }
}

/// The version named on the command line. A bare release date means its
/// latest parse.
async fn resolve_version(
  store: &SqliteStore,
  release_date: NaiveDate,
  parse_time: Option<NaiveDateTime>,
) -> anyhow::Result<Version> {
  if let Some(parse_time) = parse_time {
    return Ok(Version::new(release_date, parse_time));
  }
  match store.latest_version_for(release_date).await {
    Ok(Some(version)) => Ok(version),
    Ok(None) => bail!("no data for requested version"),
    Err(e) => no_data(e),
  }
}

/// Log a lookup failure and replace it with the user-facing message.
fn no_data<T>(e: revtab_store_sqlite::Error) -> anyhow::Result<T> {
  warn!(error = %e, "lookup failed");
  bail!("no data for requested version")
}
