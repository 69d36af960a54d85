//! Insert phase: single-row inserts, then fixed-size batches, each batch in
//! its own transaction.

use tracing::warn;

use super::{Phase, PhaseContext, PhaseError, Tally, report_progress};
use crate::engine::{StorageEngine, StorageError, with_transaction};
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::schema::INSERT_USER;
use crate::timing::timed;

#[derive(Debug, Default)]
struct BatchTally {
    rows: u64,
    rows_failed: u64,
    batches_failed: u64,
}

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let spec = ctx.spec;
    let single_target = spec.insert.single_inserts;
    let batch_size = spec.insert.batch_size;
    let batches = spec.insert_batches();
    let interval = spec.progress_interval;

    let single = timed(|| {
        let mut tally = Tally::default();
        for i in 0..single_target {
            let user = ctx.generator.user(i);
            tally.absorb(ctx.engine.execute(INSERT_USER, &user.params()))?;
            report_progress(Phase::Insert, "single", i + 1, single_target, interval);
        }
        Ok::<_, StorageError>(tally)
    })?;

    let batched = timed(|| {
        let mut tally = BatchTally::default();
        for b in 0..batches {
            let base = single_target + b * batch_size;
            let generator = &mut *ctx.generator;
            let outcome = with_transaction(&mut *ctx.engine, |engine| {
                for offset in 0..batch_size {
                    let user = generator.user(base + offset);
                    engine.execute(INSERT_USER, &user.params())?;
                }
                Ok(())
            });
            match outcome {
                Ok(()) => tally.rows += batch_size,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(batch = b, error = %err, "batch rolled back");
                    tally.rows_failed += batch_size;
                    tally.batches_failed += 1;
                }
            }
            report_progress(Phase::Insert, "batch", b + 1, batches, 1);
        }
        Ok(tally)
    })?;

    let total = single.value.ok + batched.value.rows;
    let mut metrics = PhaseMetrics::new(Phase::Insert.as_str());
    metrics.push_timing("single_inserts", single.elapsed_ms(), single.value.ok);
    metrics.push_timing("batch_inserts", batched.elapsed_ms(), batched.value.rows);
    metrics.set_counter("single_inserted", MetricValue::Count(count_i64(single.value.ok)));
    metrics.set_counter("batches", MetricValue::Count(count_i64(batches)));
    metrics.set_counter("batch_inserted", MetricValue::Count(count_i64(batched.value.rows)));
    metrics.set_counter(
        "failed_rows",
        MetricValue::Count(count_i64(single.value.failed + batched.value.rows_failed)),
    );
    metrics.set_counter(
        "failed_batches",
        MetricValue::Count(count_i64(batched.value.batches_failed)),
    );
    metrics.set_counter("total_records", MetricValue::Count(count_i64(total)));
    metrics.finish(single.elapsed_ms() + batched.elapsed_ms(), total);
    Ok(metrics)
}
