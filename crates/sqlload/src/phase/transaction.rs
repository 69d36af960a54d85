//! Transaction phase: one committed multi-row transaction, then one that is
//! rolled back and must leave the table unchanged.

use tracing::info;

use super::{Phase, PhaseContext, PhaseError};
use crate::engine::{StorageEngine, StorageError, query_scalar_i64, with_transaction};
use crate::generator::ValueGenerator;
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::schema::{INSERT_TRANSACTION, MAX_USER_ID};
use crate::timing::timed;

const COUNT_TRANSACTIONS: &str = "SELECT COUNT(*) FROM transactions";

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let committed_rows = ctx.spec.transaction.committed_rows;
    let rollback_writes = ctx.spec.transaction.rollback_writes;
    let max_id = query_scalar_i64(&mut *ctx.engine, MAX_USER_ID, &[])?;

    let commit = timed(|| {
        let generator = &mut *ctx.generator;
        with_transaction(&mut *ctx.engine, |engine| {
            for _ in 0..committed_rows {
                let user_id = generator.user_id(max_id);
                let tx = generator.transaction(user_id);
                engine.execute(INSERT_TRANSACTION, &tx.params())?;
            }
            Ok(())
        })
    })?;

    let before = query_scalar_i64(&mut *ctx.engine, COUNT_TRANSACTIONS, &[])?;

    let rollback = timed(|| {
        write_then_roll_back(&mut *ctx.engine, &mut *ctx.generator, rollback_writes, max_id)
    })?;

    let after = query_scalar_i64(&mut *ctx.engine, COUNT_TRANSACTIONS, &[])?;
    if before != after {
        return Err(PhaseError::Verification(format!(
            "rolled-back writes are visible: {before} rows before, {after} after"
        )));
    }
    info!(rows = after, "rollback left transactions unchanged");

    let mut metrics = PhaseMetrics::new(Phase::Transaction.as_str());
    metrics.push_timing("commit", commit.elapsed_ms(), committed_rows);
    metrics.push_timing("rollback", rollback.elapsed_ms(), rollback_writes);
    metrics.set_counter("committed_rows", MetricValue::Count(count_i64(committed_rows)));
    metrics.set_counter("rollback_writes", MetricValue::Count(count_i64(rollback_writes)));
    metrics.set_counter("rows_before_rollback", MetricValue::Count(before));
    metrics.set_counter("rows_after_rollback", MetricValue::Count(after));
    metrics.set_counter("rollback_verified", MetricValue::Flag(true));
    metrics.finish(
        commit.elapsed_ms() + rollback.elapsed_ms(),
        committed_rows + rollback_writes,
    );
    Ok(metrics)
}

/// Write `rows` transactions inside an explicit transaction and roll it
/// back.  The rollback is attempted even when a write fails.
fn write_then_roll_back<E: StorageEngine>(
    engine: &mut E,
    generator: &mut ValueGenerator,
    rows: u64,
    max_id: i64,
) -> Result<(), StorageError> {
    engine.begin()?;
    let mut written = Ok(());
    for _ in 0..rows {
        let user_id = generator.user_id(max_id);
        let tx = generator.transaction(user_id);
        if let Err(err) = engine.execute(INSERT_TRANSACTION, &tx.params()) {
            written = Err(err);
            break;
        }
    }
    let rolled_back = engine.rollback();
    written.and(rolled_back)
}
