//! Statistics phase: final row counts and aggregates for the report.

use super::{Phase, PhaseContext, PhaseError};
use crate::engine::{SqlValue, StorageEngine, query_scalar_i64};
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::schema::TABLES;
use crate::timing::timed;

const USER_AGGREGATES: &str =
    "SELECT AVG(age), MIN(age), MAX(age), AVG(salary) FROM users";
const ACTIVE_USERS: &str = "SELECT COUNT(*) FROM users WHERE is_active = 1";

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let mut metrics = PhaseMetrics::new(Phase::Statistics.as_str());
    let mut total_ms = 0.0;
    let mut reads = 0_u64;

    for table in TABLES {
        let count = timed(|| {
            query_scalar_i64(&mut *ctx.engine, &format!("SELECT COUNT(*) FROM {table}"), &[])
        })?;
        total_ms += count.elapsed_ms();
        reads += 1;
        metrics.set_counter(format!("{table}_rows"), MetricValue::Count(count.value));
    }

    let aggregates = timed(|| ctx.engine.query(USER_AGGREGATES, &[]))?;
    total_ms += aggregates.elapsed_ms();
    reads += 1;
    let row = aggregates.value.into_iter().next().unwrap_or_default();
    let column = |idx: usize| row.get(idx).and_then(SqlValue::as_f64).unwrap_or(0.0);
    metrics.set_counter("avg_age", MetricValue::Number(column(0)));
    metrics.set_counter("min_age", MetricValue::Number(column(1)));
    metrics.set_counter("max_age", MetricValue::Number(column(2)));
    metrics.set_counter("avg_salary", MetricValue::Number(column(3)));

    let active = timed(|| query_scalar_i64(&mut *ctx.engine, ACTIVE_USERS, &[]))?;
    total_ms += active.elapsed_ms();
    reads += 1;
    metrics.set_counter("active_users", MetricValue::Count(active.value));

    let size = timed(|| ctx.engine.storage_size())?;
    total_ms += size.elapsed_ms();
    reads += 1;
    metrics.set_counter("storage_size", MetricValue::Bytes(count_i64(size.value)));

    metrics.finish(total_ms, reads);
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, WorkloadSpec};
    use crate::generator::ValueGenerator;
    use crate::schema::{self, INSERT_USER};
    use crate::sqlite_engine::SqliteEngine;

    #[test]
    fn reports_counts_for_every_table() {
        let spec = WorkloadSpec::default();
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 8).unwrap();
        for i in 0..4 {
            let user = generator.user(i);
            engine.execute(INSERT_USER, &user.params()).unwrap();
        }

        let metrics = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap();

        assert_eq!(metrics.counter("users_rows"), Some(&MetricValue::Count(4)));
        assert_eq!(metrics.counter("logs_rows"), Some(&MetricValue::Count(0)));
        assert!(metrics.counter("concurrent_test_rows").is_some());
        let avg = metrics.counter("avg_age").and_then(MetricValue::as_f64).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let min_age = spec.values.age.min as f64;
        assert!(avg >= min_age);
        assert_eq!(metrics.operations, 8);
    }

    #[test]
    fn empty_database_reports_zero_aggregates() {
        let spec = WorkloadSpec::default();
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 8).unwrap();
        let metrics = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap();
        assert_eq!(metrics.counter("avg_age"), Some(&MetricValue::Number(0.0)));
        assert_eq!(metrics.counter("active_users"), Some(&MetricValue::Count(0)));
    }
}
