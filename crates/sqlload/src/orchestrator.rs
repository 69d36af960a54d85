//! Phase orchestrator: runs every phase in order against one database and
//! collects the outcome into a [`RunResult`].
//!
//! # Lifecycle
//!
//! 1. **Initialized**: the primary connection is open, the schema is fresh and
//!    the environment snapshot is taken.
//! 2. **Running**: phases execute strictly in [`Phase::ALL`] order.  Each
//!    started phase gets exactly one entry in the result, with `error` set if
//!    it failed.
//! 3. **Finalized**: the primary connection is closed and the result sealed.
//! 4. **`CleanedUp`**: [`EngineConnector::cleanup`] has run.
//!
//! # Failure modes
//!
//! - A non-fatal phase error (constraint, busy, verification) is recorded and
//!   the next phase runs.
//! - A fatal storage error, or a panic inside a phase, is recorded as the
//!   terminal error and the remaining phases are skipped.
//!
//! Cleanup runs exactly once on every path, including unwinding.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{error, info, info_span, warn};

use crate::config::{ConfigError, WorkloadSpec};
use crate::engine::{EngineConnector, StorageEngine, StorageError};
use crate::generator::ValueGenerator;
use crate::metrics::{EnvironmentSnapshot, PhaseMetrics, ResultAggregator, RunResult};
use crate::phase::{
    Phase, PhaseContext, PhaseError, concurrency, datatype, delete, insert, maintenance, select,
    statistics, transaction, update,
};
use crate::schema;
use crate::timing::{duration_ms, unix_ms_now};

/// Engine version recorded when the primary connection never opened.
const UNKNOWN_ENGINE: &str = "unknown";

// ── Lifecycle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Initialized,
    Running(Phase),
    Finalized,
    CleanedUp,
}

#[derive(Debug)]
struct StateTrail {
    current: RunState,
    history: Vec<RunState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            current: RunState::Uninitialized,
            history: vec![RunState::Uninitialized],
        }
    }

    fn advance(&mut self, next: RunState) {
        self.current = next;
        self.history.push(next);
    }
}

/// Calls [`EngineConnector::cleanup`] at most once, from [`Self::run`] or
/// from `Drop` if the run unwinds first.
struct CleanupGuard<'a, C: EngineConnector> {
    connector: &'a C,
    done: bool,
}

impl<'a, C: EngineConnector> CleanupGuard<'a, C> {
    fn new(connector: &'a C) -> Self {
        Self {
            connector,
            done: false,
        }
    }

    fn run(&mut self) -> io::Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.connector.cleanup()
    }
}

impl<C: EngineConnector> Drop for CleanupGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.run() {
            warn!(error = %err, "cleanup failed");
        }
    }
}

// ── Orchestrator ───────────────────────────────────────────────────────

pub struct PhaseOrchestrator<C: EngineConnector> {
    connector: C,
    spec: WorkloadSpec,
    trail: StateTrail,
}

impl<C: EngineConnector> PhaseOrchestrator<C> {
    #[must_use]
    pub fn new(connector: C, spec: WorkloadSpec) -> Self {
        Self {
            connector,
            spec,
            trail: StateTrail::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.trail.current
    }

    /// Every state the orchestrator has passed through, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.trail.history
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run every phase and return the sealed result.
    ///
    /// Only an invalid workload fails this call; storage and phase failures
    /// are reported inside the [`RunResult`].  A run can be started once.
    pub fn run(&mut self) -> Result<RunResult, ConfigError> {
        if self.trail.current != RunState::Uninitialized {
            return Err(ConfigError::InvalidSetting {
                field: "orchestrator",
                reason: "a run has already been started".to_owned(),
            });
        }
        self.spec.validate()?;
        let generator = ValueGenerator::new(&self.spec.values, self.spec.seed)?;

        let span = info_span!("run", seed = self.spec.seed);
        let _enter = span.enter();

        let mut cleanup = CleanupGuard::new(&self.connector);
        let result = execute(&self.connector, &self.spec, &mut self.trail, generator);
        match cleanup.run() {
            Ok(()) => info!("cleanup complete"),
            Err(err) => warn!(error = %err, "cleanup failed"),
        }
        self.trail.advance(RunState::CleanedUp);
        Ok(result)
    }
}

/// Everything between connecting and sealing the result.  The primary
/// connection is dropped before this returns.
fn execute<C: EngineConnector>(
    connector: &C,
    spec: &WorkloadSpec,
    trail: &mut StateTrail,
    mut generator: ValueGenerator,
) -> RunResult {
    let started = Instant::now();

    let mut primary = match open_primary(connector) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "initialization failed");
            let mut aggregator =
                ResultAggregator::new(EnvironmentSnapshot::capture(UNKNOWN_ENGINE, spec.seed));
            aggregator.set_terminal_error(format!("initialize: {err}"));
            trail.advance(RunState::Finalized);
            aggregator.finish(duration_ms(started.elapsed()), unix_ms_now());
            return aggregator.summarize();
        }
    };
    trail.advance(RunState::Initialized);

    let env = EnvironmentSnapshot::capture(primary.engine_version(), spec.seed);
    info!(run_id = %env.run_id, engine = %env.engine_version, "initialized");
    let mut aggregator = ResultAggregator::new(env);

    for phase in Phase::ALL {
        trail.advance(RunState::Running(phase));
        let span = info_span!("phase", name = phase.as_str());
        let _enter = span.enter();
        let phase_started = Instant::now();

        let mut ctx = PhaseContext {
            engine: &mut primary,
            generator: &mut generator,
            spec,
        };
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| dispatch(phase, connector, &mut ctx)));
        let fallback_ms = duration_ms(phase_started.elapsed());

        match outcome {
            Ok(Ok(metrics)) => {
                info!(
                    elapsed_ms = metrics.elapsed_ms,
                    operations = metrics.operations,
                    ops_per_sec = metrics.ops_per_sec,
                    "phase complete"
                );
                aggregator.record_phase(phase.as_str(), metrics);
            }
            Ok(Err(err)) => {
                let elapsed = err.elapsed_ms().unwrap_or(fallback_ms);
                aggregator.record_phase(
                    phase.as_str(),
                    PhaseMetrics::failed(phase.as_str(), elapsed, &err),
                );
                if err.is_fatal() {
                    error!(error = %err, "fatal error, skipping remaining phases");
                    aggregator.set_terminal_error(format!("{phase}: {err}"));
                    break;
                }
                warn!(error = %err, "phase failed");
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "phase panicked, skipping remaining phases");
                aggregator.record_phase(
                    phase.as_str(),
                    PhaseMetrics::failed(phase.as_str(), fallback_ms, format!("panicked: {message}")),
                );
                aggregator.set_terminal_error(format!("{phase}: panicked: {message}"));
                break;
            }
        }
    }

    drop(primary);
    trail.advance(RunState::Finalized);
    aggregator.finish(duration_ms(started.elapsed()), unix_ms_now());
    let result = aggregator.summarize();
    info!(
        phases = result.phases.len(),
        total_elapsed_ms = result.total_elapsed_ms,
        clean = result.is_clean(),
        "run finalized"
    );
    result
}

fn open_primary<C: EngineConnector>(connector: &C) -> Result<C::Engine, StorageError> {
    let mut engine = connector.connect()?;
    schema::initialize(&mut engine)?;
    Ok(engine)
}

fn dispatch<C: EngineConnector>(
    phase: Phase,
    connector: &C,
    ctx: &mut PhaseContext<'_, C::Engine>,
) -> Result<PhaseMetrics, PhaseError> {
    match phase {
        Phase::Insert => insert::run(ctx),
        Phase::Select => select::run(ctx),
        Phase::Update => update::run(ctx),
        Phase::Delete => delete::run(ctx),
        Phase::Transaction => transaction::run(ctx),
        Phase::DataType => datatype::run(ctx),
        Phase::Concurrency => concurrency::run(connector, ctx.generator, ctx.spec),
        Phase::Maintenance => maintenance::run(ctx),
        Phase::Statistics => statistics::run(ctx),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
