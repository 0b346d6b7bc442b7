//! Snapshot ingestion: one `IMMEDIATE` transaction per snapshot.
//!
//! Steps, all inside the transaction:
//!
//! 1. reject a version already in the ledger;
//! 2. intern every key of the snapshot;
//! 3. reconstruct the predecessor state (the chain as it stands, as of the
//!    new version) and, if a later version exists, that version's state;
//! 4. plan the forward diff and the repair of the following link;
//! 5. register the version, then write the forward diff;
//! 6. replace the following version's diff and invalidate its point
//!    projection.
//!
//! Any error drops the transaction, which rolls everything back.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use revtab_core::{
  chain::{State, plan_insertion, verify_link},
  snapshot::Snapshot,
  store::RecordReport,
};

use crate::{
  Result,
  encode::{CellIds, RawVersion},
  ledger,
  pool::Interner,
  projection,
  state,
};

pub fn record_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<RecordReport> {
  let version = snapshot.version();
  let raw_version = RawVersion::encode(version)?;
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  if ledger::contains(&tx, &raw_version)? {
    return Err(revtab_core::Error::DuplicateVersion(version).into());
  }
  if state::count_diffs_at(&tx, &raw_version)? != 0 {
    return Err(
      revtab_core::Error::ChainIntegrity(format!(
        "diffs exist at unrecorded version {version}"
      ))
      .into(),
    );
  }

  let inserted: State<CellIds> = {
    let mut interner = Interner::new(&tx);
    let mut cells = State::new();
    for (cell, value) in snapshot.cells() {
      cells.insert(interner.intern_cell(cell)?, value.clone());
    }
    cells
  };

  let previous = state::state_as_of(&tx, &raw_version)?;

  let next = match ledger::next(&tx, &raw_version)? {
    Some(raw_next) => {
      let next_version = raw_next.decode()?;
      verify_link(&previous, next_version, &state::diffs_at(&tx, &raw_next)?)?;
      let next_state = state::state_as_of(&tx, &raw_next)?;
      Some((next_version, raw_next, next_state))
    }
    None => None,
  };

  debug!(
    %version,
    cells = inserted.len(),
    previous_cells = previous.len(),
    next = ?next.as_ref().map(|(v, _, _)| *v),
    "reconstructed neighbouring states"
  );

  let patch = plan_insertion(
    version,
    &previous,
    &inserted,
    next.as_ref().map(|(v, _, s)| (*v, s)),
  )?;

  ledger::register(&tx, &raw_version)?;
  let forward_diffs = state::insert_diffs(&tx, &raw_version, &patch.forward)?;

  let mut report = RecordReport {
    version,
    forward_diffs,
    repaired: None,
    repaired_diffs: 0,
  };

  if let (Some(repair), Some((_, raw_next, _))) = (&patch.repair, &next) {
    let removed = state::delete_diffs_at(&tx, raw_next)?;
    report.repaired_diffs = state::insert_diffs(&tx, raw_next, &repair.diff)?;
    report.repaired = Some(repair.next_version);

    let unprojected = projection::invalidate(&tx, raw_next)?;
    info!(
      %version,
      next = %repair.next_version,
      removed,
      written = report.repaired_diffs,
      unprojected,
      "repaired diff of following version"
    );
  }

  tx.commit()?;
  Ok(report)
}
