//! Phase-ordered load and correctness harness for SQLite-compatible storage
//! engines.
//!
//! This crate provides the infrastructure for:
//! - **Workload shaping**: a typed, defaulted [`config::WorkloadSpec`] that
//!   drives every quantity and value range
//! - **Synthetic values**: seeded record generation ([`generator`])
//! - **Phase orchestration**: insert → select → update → delete →
//!   transaction → datatype → concurrency → maintenance → statistics
//!   ([`orchestrator`])
//! - **Concurrent workers**: isolated threads, one connection each, running
//!   insert/update/read triples against a shared database file ([`pool`])
//! - **Aggregation**: an ordered [`metrics::RunResult`] that can be rendered
//!   as JSON or Markdown ([`report_render`])

pub mod config;
pub mod engine;
pub mod generator;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod phase;
pub mod pool;
pub mod report_render;
pub mod schema;
pub mod sqlite_engine;
pub mod timing;
pub mod workspace;

// ─── Deterministic Seed Constants ────────────────────────────────────────
//
// Every run derives its RNG state from a base seed, so a run can be replayed
// exactly by passing the same seed (config file or `--seed`).

/// Default seed used when neither the workload document nor the CLI supplies
/// one.
pub const DEFAULT_SEED: u64 = 0x5351_4C4C_4F41_44; // "SQLLOAD" as ASCII bytes

/// Derives a worker-specific seed from a base seed and worker ID.
///
/// Each worker in the concurrency phase gets a distinct but deterministic RNG
/// stream.
///
/// `worker_seed = base_seed ^ (worker_id * 0x9E3779B97F4A7C15)`
#[inline]
#[must_use]
pub const fn derive_worker_seed(base_seed: u64, worker_id: u16) -> u64 {
    base_seed ^ ((worker_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Result type alias used by the top-level entry points.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that can end a harness invocation before a [`metrics::RunResult`]
/// exists, or while persisting one.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The workload document is malformed.
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    /// An I/O error from the filesystem.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A report could not be serialized.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
