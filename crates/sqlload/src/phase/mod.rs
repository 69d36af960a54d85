//! The nine workload phases.
//!
//! Every sequential phase is a function `run(&mut PhaseContext) ->
//! Result<PhaseMetrics, PhaseError>` sharing the orchestrator's primary
//! connection.  The concurrency phase instead opens its own connections
//! through the connector ([`concurrency::run`]).

pub mod concurrency;
pub mod datatype;
pub mod delete;
pub mod insert;
pub mod maintenance;
pub mod select;
pub mod statistics;
pub mod transaction;
pub mod update;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WorkloadSpec;
use crate::engine::{StorageEngine, StorageError};
use crate::generator::ValueGenerator;
use crate::pool::PoolError;
use crate::timing::TimedError;

/// Workload phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Insert,
    Select,
    Update,
    Delete,
    Transaction,
    DataType,
    Concurrency,
    Maintenance,
    Statistics,
}

impl Phase {
    pub const ALL: [Self; 9] = [
        Self::Insert,
        Self::Select,
        Self::Update,
        Self::Delete,
        Self::Transaction,
        Self::DataType,
        Self::Concurrency,
        Self::Maintenance,
        Self::Statistics,
    ];

    /// Key under which the phase's metrics are recorded.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Select => "select",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Transaction => "transaction",
            Self::DataType => "datatype",
            Self::Concurrency => "concurrency",
            Self::Maintenance => "maintenance",
            Self::Statistics => "statistics",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sequential phase runs against.
pub struct PhaseContext<'a, E: StorageEngine> {
    pub engine: &'a mut E,
    pub generator: &'a mut ValueGenerator,
    pub spec: &'a WorkloadSpec,
}

/// Why a phase ended early.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("{source} (after {elapsed_ms:.2}ms)")]
    Storage {
        #[source]
        source: StorageError,
        elapsed_ms: f64,
    },

    #[error("worker pool: {source} (after {elapsed_ms:.2}ms)")]
    WorkerPool {
        #[source]
        source: PoolError,
        elapsed_ms: f64,
    },

    #[error("verification failed: {0}")]
    Verification(String),
}

impl PhaseError {
    /// Fatal errors end the run; anything else only ends the phase.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage { source, .. } => source.is_fatal(),
            Self::WorkerPool { .. } | Self::Verification(_) => false,
        }
    }

    /// Time spent in the failing operation, when it was measured.
    #[must_use]
    pub fn elapsed_ms(&self) -> Option<f64> {
        match self {
            Self::Storage { elapsed_ms, .. } | Self::WorkerPool { elapsed_ms, .. } => {
                Some(*elapsed_ms)
            }
            Self::Verification(_) => None,
        }
    }
}

impl From<StorageError> for PhaseError {
    fn from(source: StorageError) -> Self {
        Self::Storage {
            source,
            elapsed_ms: 0.0,
        }
    }
}

impl From<TimedError<StorageError>> for PhaseError {
    fn from(err: TimedError<StorageError>) -> Self {
        let elapsed_ms = err.elapsed_ms();
        Self::Storage {
            source: err.source,
            elapsed_ms,
        }
    }
}

impl From<TimedError<PoolError>> for PhaseError {
    fn from(err: TimedError<PoolError>) -> Self {
        let elapsed_ms = err.elapsed_ms();
        Self::WorkerPool {
            source: err.source,
            elapsed_ms,
        }
    }
}

/// Success/failure counts for a best-effort loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub ok: u64,
    pub failed: u64,
}

impl Tally {
    /// Count one operation's outcome.
    ///
    /// Non-fatal errors are counted and swallowed; fatal ones are returned so
    /// the caller can abort the phase.
    pub fn absorb<T>(&mut self, result: Result<T, StorageError>) -> Result<Option<T>, StorageError> {
        match result {
            Ok(value) => {
                self.ok += 1;
                Ok(Some(value))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.failed += 1;
                debug!(error = %err, "operation failed");
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn attempted(&self) -> u64 {
        self.ok + self.failed
    }
}

/// Emit a progress event every `interval` completed items.
pub(crate) fn report_progress(phase: Phase, stage: &str, done: u64, total: u64, interval: u64) {
    if interval > 0 && done % interval == 0 {
        info!(phase = phase.as_str(), stage, done, total, "progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StorageErrorKind;

    #[test]
    fn phases_are_in_execution_order() {
        let names: Vec<_> = Phase::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            [
                "insert",
                "select",
                "update",
                "delete",
                "transaction",
                "datatype",
                "concurrency",
                "maintenance",
                "statistics"
            ]
        );
    }

    #[test]
    fn tally_counts_non_fatal_and_propagates_fatal() {
        let mut tally = Tally::default();
        assert_eq!(tally.absorb(Ok::<_, StorageError>(3)).unwrap(), Some(3));
        let busy = StorageError::new(StorageErrorKind::Busy, "locked");
        assert_eq!(tally.absorb::<()>(Err(busy)).unwrap(), None);
        let corrupt = StorageError::new(StorageErrorKind::Corrupt, "malformed");
        assert!(tally.absorb::<()>(Err(corrupt)).is_err());
        assert_eq!(tally, Tally { ok: 1, failed: 1 });
        assert_eq!(tally.attempted(), 2);
    }

    #[test]
    fn fatality_follows_storage_kind() {
        let lost: PhaseError = StorageError::new(StorageErrorKind::ConnectionLost, "gone").into();
        assert!(lost.is_fatal());
        let constraint: PhaseError = StorageError::new(StorageErrorKind::Constraint, "dup").into();
        assert!(!constraint.is_fatal());
        assert!(!PhaseError::Verification("x".into()).is_fatal());
        assert_eq!(PhaseError::Verification("x".into()).elapsed_ms(), None);
    }
}
