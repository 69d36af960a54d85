//! Concurrent worker pool for the concurrency phase.
//!
//! - One OS thread per worker, each opening its own connection through the
//!   [`EngineConnector`] inside the thread.  No handle is shared.
//! - All workers rendezvous on a barrier before their first iteration so the
//!   contention window is real.
//! - Every iteration is an insert / update / read-back triple on a uniquely
//!   keyed row.  Iteration failures are counted, never fatal: a worker always
//!   attempts exactly `operations_per_worker` iterations.
//! - A worker that cannot connect still reaches the barrier (siblings are
//!   never stranded), siblings run to completion, and the pool then reports
//!   the lowest-index failure instead of a partial result list.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Barrier;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::config::WorkloadSpec;
use crate::derive_worker_seed;
use crate::engine::{EngineConnector, SqlValue, StorageEngine, StorageError, StorageErrorKind};
use crate::generator::ValueGenerator;
use crate::schema::{INSERT_CONCURRENT, SELECT_CONCURRENT_BY_KEY, UPDATE_CONCURRENT_VALUE};
use crate::timing::{duration_ms, ops_per_sec, ratio, unix_ms_now};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub workers: u16,
    pub operations_per_worker: u64,
    /// Log a progress event every this many iterations (0 disables).
    pub progress_interval: u64,
    pub update_factor: f64,
    /// Base seed; each worker derives its own stream from it.
    pub seed: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_spec(spec: &WorkloadSpec) -> Self {
        Self {
            workers: spec.concurrency.workers,
            operations_per_worker: spec.concurrency.operations_per_worker,
            progress_interval: spec.concurrency.progress_interval,
            update_factor: spec.concurrency.update_factor,
            seed: spec.seed,
        }
    }
}

/// Per-worker outcome, produced exactly once at the end of the worker's run.
///
/// `completed + failed == attempted` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_id: u16,
    pub attempted: u64,
    pub completed: u64,
    pub failed: u64,
    pub started_unix_ms: u64,
    pub finished_unix_ms: u64,
    pub wall_time_ms: f64,
    /// Most recent iteration error, if any iteration failed.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("worker {worker} failed to start: {source}")]
pub struct WorkerStartError {
    pub worker: u16,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Start(#[from] WorkerStartError),

    #[error("worker {worker} panicked")]
    Panicked { worker: u16 },
}

impl PoolError {
    /// Index of the worker that failed.
    #[must_use]
    pub fn worker(&self) -> u16 {
        match self {
            Self::Start(e) => e.worker,
            Self::Panicked { worker } => *worker,
        }
    }
}

/// Pool-level aggregate over every worker's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub workers: usize,
    pub total_attempted: u64,
    /// Σ completed.
    pub total_operations: u64,
    /// Σ failed.
    pub total_errors: u64,
    /// Completed over attempted, as a fraction; 0 when nothing was attempted.
    pub success_rate: f64,
    /// Mean of each worker's own wall-clock time.
    pub avg_worker_wall_ms: f64,
    /// `total_operations / (avg_worker_wall_ms / 1000)`.
    pub throughput: f64,
}

impl PoolSummary {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results(results: &[WorkerResult]) -> Self {
        let total_attempted = results.iter().map(|r| r.attempted).sum::<u64>();
        let total_operations = results.iter().map(|r| r.completed).sum::<u64>();
        let total_errors = results.iter().map(|r| r.failed).sum::<u64>();
        let avg_worker_wall_ms = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.wall_time_ms).sum::<f64>() / results.len() as f64
        };
        Self {
            workers: results.len(),
            total_attempted,
            total_operations,
            total_errors,
            success_rate: ratio(total_attempted.saturating_sub(total_errors), total_attempted),
            avg_worker_wall_ms,
            throughput: ops_per_sec(total_operations, avg_worker_wall_ms),
        }
    }
}

pub struct WorkerPool<'a, C: EngineConnector> {
    connector: &'a C,
    template: &'a ValueGenerator,
    config: PoolConfig,
}

impl<'a, C: EngineConnector> WorkerPool<'a, C> {
    /// `template` supplies the value ranges; each worker reseeds it with its
    /// own derived seed.
    #[must_use]
    pub fn new(connector: &'a C, template: &'a ValueGenerator, config: PoolConfig) -> Self {
        Self {
            connector,
            template,
            config,
        }
    }

    /// Run every worker to completion and return their results in worker
    /// order.
    pub fn run(&self) -> Result<Vec<WorkerResult>, PoolError> {
        let worker_count = usize::from(self.config.workers);
        info!(
            workers = self.config.workers,
            operations_per_worker = self.config.operations_per_worker,
            "starting worker pool"
        );

        let generators: Vec<ValueGenerator> = (0..self.config.workers)
            .map(|w| self.template.reseeded(derive_worker_seed(self.config.seed, w)))
            .collect();
        let barrier = Barrier::new(worker_count);

        let outcomes: Vec<Result<WorkerResult, PoolError>> = std::thread::scope(|s| {
            let mut joins = Vec::with_capacity(worker_count);
            for (worker_id, generator) in (0..self.config.workers).zip(generators) {
                let connector = self.connector;
                let config = &self.config;
                let barrier_ref = &barrier;
                joins.push(s.spawn(move || {
                    run_worker(connector, worker_id, generator, barrier_ref, config)
                }));
            }

            joins
                .into_iter()
                .zip(0..self.config.workers)
                .map(|(join, worker)| {
                    join.join()
                        .unwrap_or_else(|_| Err(PoolError::Panicked { worker }))
                })
                .collect()
        });

        let mut results = Vec::with_capacity(worker_count);
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(worker = err.worker(), error = %err, "worker did not run");
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            warn!(
                finished_siblings = results.len(),
                "worker pool failed; sibling results discarded"
            );
            return Err(err);
        }
        Ok(results)
    }
}

fn run_worker<C: EngineConnector>(
    connector: &C,
    worker_id: u16,
    mut generator: ValueGenerator,
    barrier: &Barrier,
    config: &PoolConfig,
) -> Result<WorkerResult, PoolError> {
    let span = info_span!("worker", worker = worker_id);
    let _enter = span.enter();

    let connected = panic::catch_unwind(AssertUnwindSafe(|| connector.connect()));

    // Reached on every path so siblings are never left waiting.
    barrier.wait();

    let mut engine = match connected {
        Ok(Ok(engine)) => engine,
        Ok(Err(source)) => {
            return Err(WorkerStartError {
                worker: worker_id,
                source,
            }
            .into());
        }
        Err(_) => return Err(PoolError::Panicked { worker: worker_id }),
    };

    let started_unix_ms = unix_ms_now();
    let started = Instant::now();
    let mut completed: u64 = 0;
    let mut failed: u64 = 0;
    let mut last_error = None;

    for op in 0..config.operations_per_worker {
        match run_iteration(&mut engine, &mut generator, worker_id, op, config.update_factor) {
            Ok(()) => completed += 1,
            Err(err) => {
                failed += 1;
                debug!(op, error = %err, "iteration failed");
                last_error = Some(err.to_string());
            }
        }

        let done = op + 1;
        if config.progress_interval > 0 && done % config.progress_interval == 0 {
            debug!(
                done,
                total = config.operations_per_worker,
                completed,
                failed,
                "worker progress"
            );
        }
    }

    let wall_time_ms = duration_ms(started.elapsed());
    info!(completed, failed, wall_time_ms, "worker finished");

    Ok(WorkerResult {
        worker_id,
        attempted: config.operations_per_worker,
        completed,
        failed,
        started_unix_ms,
        finished_unix_ms: unix_ms_now(),
        wall_time_ms,
        last_error,
    })
}

/// Insert a uniquely keyed row, scale its value, then read it back.
fn run_iteration<E: StorageEngine>(
    engine: &mut E,
    generator: &mut ValueGenerator,
    worker_id: u16,
    op: u64,
    update_factor: f64,
) -> Result<(), StorageError> {
    let row = generator.concurrent_row(worker_id, op);
    engine.execute(INSERT_CONCURRENT, &row.params())?;

    let key = SqlValue::from(row.op_key.as_str());
    engine.execute(
        UPDATE_CONCURRENT_VALUE,
        &[SqlValue::Real(update_factor), key.clone()],
    )?;

    let rows = engine.query(SELECT_CONCURRENT_BY_KEY, &[key])?;
    if rows.is_empty() {
        return Err(StorageError::new(
            StorageErrorKind::Other,
            format!("row `{}` missing on read-back", row.op_key),
        ));
    }
    Ok(())
}
