//! Runtime configuration, read from `revtab.toml` (or `--config`) and
//! `REVTAB_*` environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use revtab_store_sqlite::StoreOptions;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CliConfig {
  #[serde(default = "default_store_path")]
  pub store_path:       PathBuf,
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms:  u64,
  /// How many times `record` retries a transaction conflict.
  #[serde(default = "default_conflict_retries")]
  pub conflict_retries: u32,
}

fn default_store_path() -> PathBuf { PathBuf::from("revtab.sqlite3") }

fn default_busy_timeout_ms() -> u64 { 5_000 }

fn default_conflict_retries() -> u32 { 3 }

impl CliConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("REVTAB"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise CliConfig")
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions { busy_timeout: Duration::from_millis(self.busy_timeout_ms) }
  }

  /// The store path with a leading `~` expanded.
  pub fn store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}
