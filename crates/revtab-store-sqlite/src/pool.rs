//! String interning pools.
//!
//! Each key axis has its own `id ↔ text` table. The `UNIQUE` constraint on
//! `text` is the source of truth: a concurrent first use of the same string
//! is resolved by `INSERT OR IGNORE` followed by a lookup, so losing the race
//! simply yields the winner's id.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension as _};

use crate::encode::CellIds;
use revtab_core::snapshot::CellKey;

/// One of the three key axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
  MeasurementType,
  Location,
  Week,
}

impl Pool {
  fn table(self) -> &'static str {
    match self {
      Pool::MeasurementType => "measurement_type_pool",
      Pool::Location => "location_pool",
      Pool::Week => "week_pool",
    }
  }
}

/// Return the id of `text` in `pool`, allocating one if needed.
pub fn intern(conn: &Connection, pool: Pool, text: &str) -> rusqlite::Result<i64> {
  conn
    .prepare_cached(&format!(
      "INSERT OR IGNORE INTO {} (text) VALUES (?1)",
      pool.table()
    ))?
    .execute([text])?;
  conn
    .prepare_cached(&format!("SELECT id FROM {} WHERE text = ?1", pool.table()))?
    .query_row([text], |row| row.get(0))
}

/// Look up an id without allocating.
pub fn lookup(conn: &Connection, pool: Pool, text: &str) -> rusqlite::Result<Option<i64>> {
  conn
    .prepare_cached(&format!("SELECT id FROM {} WHERE text = ?1", pool.table()))?
    .query_row([text], |row| row.get(0))
    .optional()
}

pub fn resolve(conn: &Connection, pool: Pool, id: i64) -> rusqlite::Result<Option<String>> {
  conn
    .prepare_cached(&format!("SELECT text FROM {} WHERE id = ?1", pool.table()))?
    .query_row([id], |row| row.get(0))
    .optional()
}

/// Interns the keys of one snapshot, querying each distinct string once.
pub struct Interner<'c> {
  conn:  &'c Connection,
  cache: HashMap<(Pool, String), i64>,
}

impl<'c> Interner<'c> {
  pub fn new(conn: &'c Connection) -> Self {
    Self { conn, cache: HashMap::new() }
  }

  pub fn intern(&mut self, pool: Pool, text: &str) -> rusqlite::Result<i64> {
    if let Some(id) = self.cache.get(&(pool, text.to_owned())) {
      return Ok(*id);
    }
    let id = intern(self.conn, pool, text)?;
    self.cache.insert((pool, text.to_owned()), id);
    Ok(id)
  }

  pub fn intern_cell(&mut self, cell: &CellKey) -> rusqlite::Result<CellIds> {
    Ok(CellIds {
      measurement_type: self.intern(Pool::MeasurementType, &cell.measurement_type)?,
      location:         self.intern(Pool::Location, &cell.location)?,
      week:             self.intern(Pool::Week, &cell.week)?,
    })
  }
}
