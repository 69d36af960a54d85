//! Datatype phase: write one row per value type and read them all back.

use super::{Phase, PhaseContext, PhaseError, Tally};
use crate::engine::{SqlValue, StorageEngine, StorageError};
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::timing::timed;

const INSERT_TYPED: &str = "INSERT INTO data_types (type_name, value) VALUES (?1, ?2)";
const SELECT_TYPED: &str = "SELECT type_name, value FROM data_types ORDER BY id";

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let entries = ctx.generator.typed_entries(&ctx.spec.datatype);

    let write = timed(|| {
        let mut tally = Tally::default();
        for entry in &entries {
            let params = [SqlValue::from(entry.type_name), entry.value.clone()];
            tally.absorb(ctx.engine.execute(INSERT_TYPED, &params))?;
        }
        Ok::<_, StorageError>(tally)
    })?;

    let read = timed(|| ctx.engine.query(SELECT_TYPED, &[]))?;
    let read_ms = read.elapsed_ms();
    let rows = read.value;

    if rows.len() != entries.len() {
        return Err(PhaseError::Verification(format!(
            "wrote {} typed entries, read back {}",
            entries.len(),
            rows.len()
        )));
    }

    let matching = entries
        .iter()
        .zip(&rows)
        .filter(|(entry, row)| row.get(1) == Some(&entry.value))
        .count();
    if matching != entries.len() {
        return Err(PhaseError::Verification(format!(
            "{} of {} typed values read back differently",
            entries.len() - matching,
            entries.len()
        )));
    }

    let written = write.value.ok;
    let read_back = u64::try_from(rows.len()).unwrap_or(u64::MAX);
    let mut metrics = PhaseMetrics::new(Phase::DataType.as_str());
    metrics.push_timing("write", write.elapsed_ms(), written);
    metrics.push_timing("read", read_ms, read_back);
    metrics.set_counter("entries_written", MetricValue::Count(count_i64(written)));
    metrics.set_counter("failed_writes", MetricValue::Count(count_i64(write.value.failed)));
    metrics.set_counter("entries_read", MetricValue::Count(count_i64(read_back)));
    metrics.set_counter("values_matching", MetricValue::Count(count_i64(matching)));
    metrics.finish(write.elapsed_ms() + read_ms, written + read_back);
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, WorkloadSpec};
    use crate::generator::ValueGenerator;
    use crate::schema;
    use crate::sqlite_engine::SqliteEngine;

    #[test]
    fn every_type_round_trips() {
        let mut spec = WorkloadSpec::default();
        spec.datatype.large_text_len = 4_096;
        spec.datatype.large_blob_len = 4_096;
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 7).unwrap();

        let metrics = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap();

        assert_eq!(metrics.counter("entries_written"), Some(&MetricValue::Count(10)));
        assert_eq!(metrics.counter("entries_read"), Some(&MetricValue::Count(10)));
        assert_eq!(metrics.counter("values_matching"), Some(&MetricValue::Count(10)));
    }

    #[test]
    fn leftover_rows_fail_verification() {
        let spec = WorkloadSpec::default();
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        engine
            .execute(INSERT_TYPED, &["stale".into(), SqlValue::Null])
            .unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 7).unwrap();

        let err = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap_err();
        assert!(matches!(err, PhaseError::Verification(_)));
    }

    #[test]
    fn altered_value_fails_verification() {
        let spec = WorkloadSpec::default();
        let mut engine = SqliteEngine::open_in_memory(&EngineSettings::default()).unwrap();
        schema::initialize(&mut engine).unwrap();
        // Every write lands, but the first stored value is rewritten before
        // the read-back.
        engine
            .execute(
                "CREATE TRIGGER corrupt_first AFTER INSERT ON data_types \
                 WHEN NEW.id = 1 BEGIN \
                 UPDATE data_types SET value = 'tampered' WHERE id = 1; END",
                &[],
            )
            .unwrap();
        let mut generator = ValueGenerator::new(&spec.values, 7).unwrap();

        let err = run(&mut PhaseContext {
            engine: &mut engine,
            generator: &mut generator,
            spec: &spec,
        })
        .unwrap_err();
        match err {
            PhaseError::Verification(msg) => assert!(msg.starts_with("1 of 10"), "{msg}"),
            other => panic!("expected verification failure, got {other}"),
        }
    }
}
