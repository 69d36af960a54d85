//! Delete phase: seed disposable log rows, delete some one by one, then
//! bulk-delete the rest.

use super::{Phase, PhaseContext, PhaseError, Tally};
use crate::engine::{SqlValue, StorageEngine, StorageError, with_transaction};
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::schema::INSERT_LOG;
use crate::timing::timed;

/// `logs.source` of the rows this phase creates and removes.
pub const DISPOSABLE_SOURCE: &str = "delete_phase";

const DELETE_LOG_BY_ID: &str = "DELETE FROM logs WHERE id = ?1";
const DELETE_LOGS_BY_SOURCE: &str = "DELETE FROM logs WHERE source = ?1";

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let spec = &ctx.spec.delete;
    let disposable = spec.disposable_rows;
    let single_deletes = spec.single_deletes;

    // Setup failures end the phase.
    let setup = timed(|| {
        let generator = &mut *ctx.generator;
        with_transaction(&mut *ctx.engine, |engine| {
            let mut ids = Vec::new();
            for _ in 0..disposable {
                let log = generator.log(DISPOSABLE_SOURCE);
                ids.push(engine.execute(INSERT_LOG, &log.params())?.last_insert_id);
            }
            Ok(ids)
        })
    })?;

    let single = timed(|| {
        let mut tally = Tally::default();
        let mut rows = 0_u64;
        for id in setup.value.iter().take(usize::try_from(single_deletes).unwrap_or(usize::MAX)) {
            if let Some(outcome) =
                tally.absorb(ctx.engine.execute(DELETE_LOG_BY_ID, &[SqlValue::Integer(*id)]))?
            {
                rows += outcome.rows_affected;
            }
        }
        Ok::<_, StorageError>((tally, rows))
    })?;
    let (single_tally, single_rows) = single.value;

    let bulk = timed(|| {
        ctx.engine
            .execute(DELETE_LOGS_BY_SOURCE, &[SqlValue::from(DISPOSABLE_SOURCE)])
    })?;
    let bulk_rows = bulk.value.rows_affected;

    let mut metrics = PhaseMetrics::new(Phase::Delete.as_str());
    metrics.push_timing("setup_insert", setup.elapsed_ms(), disposable);
    metrics.push_timing("single_deletes", single.elapsed_ms(), single_tally.ok);
    metrics.push_timing("bulk_delete", bulk.elapsed_ms(), 1);
    metrics.set_counter("disposable_rows", MetricValue::Count(count_i64(disposable)));
    metrics.set_counter("single_deleted", MetricValue::Count(count_i64(single_rows)));
    metrics.set_counter(
        "failed_single_deletes",
        MetricValue::Count(count_i64(single_tally.failed)),
    );
    metrics.set_counter("bulk_deleted", MetricValue::Count(count_i64(bulk_rows)));
    metrics.set_counter(
        "rows_deleted",
        MetricValue::Count(count_i64(single_rows + bulk_rows)),
    );
    metrics.finish(
        single.elapsed_ms() + bulk.elapsed_ms(),
        single_tally.ok + 1,
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, WorkloadSpec};
    use crate::engine::query_scalar_i64;
    use crate::generator::ValueGenerator;
    use crate::schema;
    use crate::sqlite_engine::SqliteEngine;

    #[test]
    fn deletes_every_disposable_row_and_nothing_else() {
        let mut spec = WorkloadSpec::default();
        spec.delete.disposable_rows = 20;
        spec.delete.single_deletes = 7;
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 5).unwrap();
        let keep = generator.log("application");
        engine.execute(INSERT_LOG, &keep.params()).unwrap();

        let metrics = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap();

        assert_eq!(metrics.counter("single_deleted"), Some(&MetricValue::Count(7)));
        assert_eq!(metrics.counter("bulk_deleted"), Some(&MetricValue::Count(13)));
        assert_eq!(metrics.counter("rows_deleted"), Some(&MetricValue::Count(20)));
        assert_eq!(
            query_scalar_i64(&mut engine, "SELECT COUNT(*) FROM logs", &[]).unwrap(),
            1
        );
    }

    #[test]
    fn more_single_deletes_than_rows_is_capped() {
        let mut spec = WorkloadSpec::default();
        spec.delete.disposable_rows = 3;
        spec.delete.single_deletes = 10;
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 5).unwrap();
        let metrics = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap();
        assert_eq!(metrics.counter("single_deleted"), Some(&MetricValue::Count(3)));
        assert_eq!(metrics.counter("bulk_deleted"), Some(&MetricValue::Count(0)));
    }
}
