//! Update phase: single-row updates, a multi-row transaction, and one bulk
//! predicate update.

use tracing::warn;

use super::{Phase, PhaseContext, PhaseError, Tally};
use crate::engine::{SqlValue, StorageEngine, StorageError, query_scalar_i64, with_transaction};
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::schema::MAX_USER_ID;
use crate::timing::timed;

const UPDATE_SALARY: &str =
    "UPDATE users SET salary = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2";

const UPDATE_CITY_AND_AGE: &str =
    "UPDATE users SET city = ?1, age = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?3";

const BULK_DEACTIVATE: &str =
    "UPDATE users SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE age > ?1";

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let workload = ctx.spec;
    let spec = &workload.update;
    let max_id = query_scalar_i64(&mut *ctx.engine, MAX_USER_ID, &[])?;

    let single = timed(|| {
        let mut tally = Tally::default();
        let mut rows = 0_u64;
        for _ in 0..spec.single_updates {
            let params = [
                SqlValue::Real(ctx.generator.salary()),
                SqlValue::Integer(ctx.generator.user_id(max_id)),
            ];
            if let Some(outcome) = tally.absorb(ctx.engine.execute(UPDATE_SALARY, &params))? {
                rows += outcome.rows_affected;
            }
        }
        Ok::<_, StorageError>((tally, rows))
    })?;
    let (single_tally, single_rows) = single.value;

    let batch = timed(|| {
        let generator = &mut *ctx.generator;
        let outcome = with_transaction(&mut *ctx.engine, |engine| {
            let mut rows = 0_u64;
            for _ in 0..spec.batch_updates {
                let params = [
                    SqlValue::Text(generator.city()),
                    SqlValue::Integer(generator.age()),
                    SqlValue::Integer(generator.user_id(max_id)),
                ];
                rows += engine.execute(UPDATE_CITY_AND_AGE, &params)?.rows_affected;
            }
            Ok(rows)
        });
        match outcome {
            Ok(rows) => Ok((true, rows)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, "batch update rolled back");
                Ok((false, 0))
            }
        }
    })?;
    let (batch_committed, batch_rows) = batch.value;

    let bulk = timed(|| {
        ctx.engine
            .execute(BULK_DEACTIVATE, &[SqlValue::Integer(spec.bulk_min_age)])
    })?;
    let bulk_rows = bulk.value.rows_affected;

    let batch_ops = if batch_committed { spec.batch_updates } else { 0 };
    let operations = single_tally.ok + batch_ops + 1;

    let mut metrics = PhaseMetrics::new(Phase::Update.as_str());
    metrics.push_timing("single_updates", single.elapsed_ms(), single_tally.ok);
    metrics.push_timing("batch_updates", batch.elapsed_ms(), batch_ops);
    metrics.push_timing("bulk_update", bulk.elapsed_ms(), 1);
    metrics.set_counter("single_rows_affected", MetricValue::Count(count_i64(single_rows)));
    metrics.set_counter("failed_single_updates", MetricValue::Count(count_i64(single_tally.failed)));
    metrics.set_counter("batch_committed", MetricValue::Flag(batch_committed));
    metrics.set_counter("batch_rows_affected", MetricValue::Count(count_i64(batch_rows)));
    metrics.set_counter("bulk_rows_affected", MetricValue::Count(count_i64(bulk_rows)));
    metrics.finish(
        single.elapsed_ms() + batch.elapsed_ms() + bulk.elapsed_ms(),
        operations,
    );
    Ok(metrics)
}
