//! Maintenance phase: refresh planner statistics, reclaim free space, and
//! report how much the database shrank.

use tracing::info;

use super::{Phase, PhaseContext, PhaseError};
use crate::engine::StorageEngine;
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::timing::timed;

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let before = ctx.engine.storage_size()?;
    let reindex = timed(|| ctx.engine.reindex_statistics())?;
    let reclaim = timed(|| ctx.engine.reclaim_space())?;
    let after = ctx.engine.storage_size()?;

    let saved = count_i64(before) - count_i64(after);
    let ratio = reclaim_percent(before, saved);
    info!(before, after, saved, "space reclaimed");

    let mut metrics = PhaseMetrics::new(Phase::Maintenance.as_str());
    metrics.push_timing("reindex_statistics", reindex.elapsed_ms(), 1);
    metrics.push_timing("reclaim_space", reclaim.elapsed_ms(), 1);
    metrics.set_counter("size_before", MetricValue::Bytes(count_i64(before)));
    metrics.set_counter("size_after", MetricValue::Bytes(count_i64(after)));
    metrics.set_counter("space_saved", MetricValue::Bytes(saved));
    metrics.set_counter("compression_ratio", MetricValue::Percent(ratio));
    metrics.finish(reindex.elapsed_ms() + reclaim.elapsed_ms(), 2);
    Ok(metrics)
}

/// `saved / before * 100`; 0 for an empty database.  Negative when the
/// database grew.
#[allow(clippy::cast_precision_loss)]
fn reclaim_percent(before: u64, saved: i64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    saved as f64 / before as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, WorkloadSpec};
    use crate::engine::{ExecOutcome, Row, SqlValue, StorageError};
    use crate::generator::ValueGenerator;
    use crate::sqlite_engine::SqliteEngine;

    /// Reports scripted sizes and records which maintenance calls ran.
    struct SizedEngine {
        sizes: Vec<u64>,
        calls: Vec<&'static str>,
    }

    impl StorageEngine for SizedEngine {
        fn execute(&mut self, _: &str, _: &[SqlValue]) -> Result<ExecOutcome, StorageError> {
            Ok(ExecOutcome::default())
        }
        fn query(&mut self, _: &str, _: &[SqlValue]) -> Result<Vec<Row>, StorageError> {
            Ok(Vec::new())
        }
        fn begin(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
        fn commit(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
        fn reindex_statistics(&mut self) -> Result<(), StorageError> {
            self.calls.push("reindex");
            Ok(())
        }
        fn reclaim_space(&mut self) -> Result<(), StorageError> {
            self.calls.push("reclaim");
            Ok(())
        }
        fn storage_size(&mut self) -> Result<u64, StorageError> {
            Ok(self.sizes.remove(0))
        }
        fn engine_version(&self) -> String {
            "sized".to_owned()
        }
    }

    fn run_with(engine: &mut impl StorageEngine) -> PhaseMetrics {
        let spec = WorkloadSpec::default();
        let mut generator = ValueGenerator::new(&spec.values, 1).unwrap();
        run(&mut PhaseContext {
            engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap()
    }

    #[test]
    fn reports_space_saved_and_ratio() {
        let mut engine = SizedEngine {
            sizes: vec![1_000, 800],
            calls: Vec::new(),
        };
        let metrics = run_with(&mut engine);
        assert_eq!(engine.calls, ["reindex", "reclaim"]);
        assert_eq!(metrics.counter("space_saved"), Some(&MetricValue::Bytes(200)));
        let ratio = metrics.counter("compression_ratio").unwrap();
        assert_eq!(ratio.to_string(), "20.00%");
    }

    #[test]
    fn growth_is_negative_and_empty_is_zero() {
        let mut grew = SizedEngine {
            sizes: vec![1_000, 1_100],
            calls: Vec::new(),
        };
        let metrics = run_with(&mut grew);
        assert_eq!(metrics.counter("space_saved"), Some(&MetricValue::Bytes(-100)));
        assert_eq!(
            metrics.counter("compression_ratio"),
            Some(&MetricValue::Percent(-10.0))
        );

        let mut empty = SizedEngine {
            sizes: vec![0, 0],
            calls: Vec::new(),
        };
        let metrics = run_with(&mut empty);
        assert_eq!(
            metrics.counter("compression_ratio"),
            Some(&MetricValue::Percent(0.0))
        );
    }

    #[test]
    fn runs_against_sqlite() {
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        crate::schema::initialize(&mut engine).unwrap();
        let metrics = run_with(&mut engine);
        assert!(metrics.is_ok());
        assert!(metrics.counter("size_before").is_some());
    }
}
