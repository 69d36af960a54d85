//! Concurrency phase: the worker pool against a shared database file.

use super::{Phase, PhaseError};
use crate::config::WorkloadSpec;
use crate::engine::EngineConnector;
use crate::generator::ValueGenerator;
use crate::metrics::{MetricValue, PhaseMetrics};
use crate::pool::{PoolConfig, WorkerPool};
use crate::timing::timed;

/// Run the pool and fold its per-worker results into one phase entry.
///
/// Workers open their own connections through `connector`; the caller's
/// primary connection stays idle for the duration.
pub fn run<C: EngineConnector>(
    connector: &C,
    generator: &ValueGenerator,
    spec: &WorkloadSpec,
) -> Result<PhaseMetrics, PhaseError> {
    let pool = WorkerPool::new(connector, generator, PoolConfig::from_spec(spec));
    let outcome = timed(|| pool.run())?;

    let mut metrics = PhaseMetrics::from_workers(Phase::Concurrency.as_str(), &outcome.value);
    metrics.set_counter("pool_wall_ms", MetricValue::Millis(outcome.elapsed_ms()));
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::engine::{StorageEngine, query_scalar_i64};
    use crate::schema;
    use crate::sqlite_engine::SqliteConnector;

    #[test]
    fn four_workers_fifty_ops_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path().join("c.db"), EngineSettings::default());
        let mut primary = connector.connect().unwrap();
        schema::initialize(&mut primary).unwrap();

        let mut spec = WorkloadSpec::default();
        spec.concurrency.workers = 4;
        spec.concurrency.operations_per_worker = 50;
        let generator = ValueGenerator::new(&spec.values, spec.seed).unwrap();

        let metrics = run(&connector, &generator, &spec).unwrap();
        assert_eq!(metrics.counter("workers"), Some(&MetricValue::Count(4)));
        assert_eq!(metrics.counter("total_operations"), Some(&MetricValue::Count(200)));
        assert_eq!(metrics.counter("total_errors"), Some(&MetricValue::Count(0)));
        assert_eq!(metrics.counter("success_rate").unwrap().to_string(), "100.00%");
        assert_eq!(metrics.timings.len(), 4);
        assert_eq!(
            query_scalar_i64(&mut primary, "SELECT COUNT(*) FROM concurrent_test", &[]).unwrap(),
            200
        );
        assert!(primary.engine_version().starts_with("sqlite "));
    }
}
