//! Phase metrics and the run-level result tree.
//!
//! Phases produce one [`PhaseMetrics`] each; the [`ResultAggregator`] keeps
//! them in execution order and produces the final [`RunResult`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pool::{PoolSummary, WorkerResult};
use crate::timing::ops_per_sec;

/// JSON schema version for serialized [`RunResult`]s.
pub const RUN_RESULT_SCHEMA_V1: &str = "sqlload.run_result.v1";

// ── Values ─────────────────────────────────────────────────────────────

/// A phase-specific counter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Count(i64),
    /// Signed so that growth can be reported as a negative saving.
    Bytes(i64),
    Millis(f64),
    Rate(f64),
    /// Percentage in `0..=100` (may exceed the bounds for ratios like growth).
    Percent(f64),
    Number(f64),
    Flag(bool),
    Text(String),
}

impl MetricValue {
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Count(n) | Self::Bytes(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Millis(v) | Self::Rate(v) | Self::Percent(v) | Self::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Bytes(n) => write!(f, "{n} B"),
            Self::Millis(v) => write!(f, "{v:.2}ms"),
            Self::Rate(v) => write!(f, "{v:.2}/s"),
            Self::Percent(v) => write!(f, "{v:.2}%"),
            Self::Number(v) => write!(f, "{v:.2}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: MetricValue,
}

/// Timing of one stage within a phase (e.g. single vs. batch inserts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTiming {
    pub label: String,
    pub elapsed_ms: f64,
    pub operations: u64,
    pub ops_per_sec: f64,
}

// ── Phase metrics ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub name: String,
    pub elapsed_ms: f64,
    pub operations: u64,
    pub ops_per_sec: f64,
    pub timings: Vec<SubTiming>,
    pub counters: Vec<Counter>,
    /// Set when the phase failed; the other fields hold what was measured
    /// before the failure.
    pub error: Option<String>,
}

impl PhaseMetrics {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elapsed_ms: 0.0,
            operations: 0,
            ops_per_sec: 0.0,
            timings: Vec::new(),
            counters: Vec::new(),
            error: None,
        }
    }

    /// An entry for a phase that failed before producing measurements.
    #[must_use]
    pub fn failed(name: impl Into<String>, elapsed_ms: f64, error: impl fmt::Display) -> Self {
        let mut metrics = Self::new(name);
        metrics.elapsed_ms = elapsed_ms;
        metrics.error = Some(error.to_string());
        metrics
    }

    /// Record a stage timing; its throughput is derived from `operations`.
    pub fn push_timing(&mut self, label: impl Into<String>, elapsed_ms: f64, operations: u64) {
        self.timings.push(SubTiming {
            label: label.into(),
            elapsed_ms,
            operations,
            ops_per_sec: ops_per_sec(operations, elapsed_ms),
        });
    }

    /// Set a counter, replacing any earlier value under the same name.
    pub fn set_counter(&mut self, name: impl Into<String>, value: MetricValue) {
        let name = name.into();
        if let Some(existing) = self.counters.iter_mut().find(|c| c.name == name) {
            existing.value = value;
        } else {
            self.counters.push(Counter { name, value });
        }
    }

    /// Close the phase with its total time and operation count.
    pub fn finish(&mut self, elapsed_ms: f64, operations: u64) {
        self.elapsed_ms = elapsed_ms;
        self.operations = operations;
        self.ops_per_sec = ops_per_sec(operations, elapsed_ms);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<&MetricValue> {
        self.counters.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    #[must_use]
    pub fn timing(&self, label: &str) -> Option<&SubTiming> {
        self.timings.iter().find(|t| t.label == label)
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Fold a worker pool's outcome into one phase entry.
    #[must_use]
    pub fn from_workers(name: impl Into<String>, workers: &[WorkerResult]) -> Self {
        let summary = PoolSummary::from_results(workers);
        let mut metrics = Self::new(name);
        for w in workers {
            metrics.push_timing(format!("worker_{}", w.worker_id), w.wall_time_ms, w.completed);
        }
        metrics.set_counter("workers", MetricValue::Count(count_i64(summary.workers)));
        metrics.set_counter(
            "total_operations",
            MetricValue::Count(count_i64(summary.total_operations)),
        );
        metrics.set_counter(
            "total_errors",
            MetricValue::Count(count_i64(summary.total_errors)),
        );
        metrics.set_counter(
            "success_rate",
            MetricValue::Percent(summary.success_rate * 100.0),
        );
        metrics.set_counter(
            "avg_worker_ms",
            MetricValue::Millis(summary.avg_worker_wall_ms),
        );
        metrics.set_counter("throughput", MetricValue::Rate(summary.throughput));
        metrics.elapsed_ms = summary.avg_worker_wall_ms;
        metrics.operations = summary.total_operations;
        metrics.ops_per_sec = summary.throughput;
        metrics
    }
}

/// Saturating conversion for counters.
#[must_use]
pub fn count_i64<T: TryInto<i64>>(n: T) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}

// ── Run result ─────────────────────────────────────────────────────────

/// Where and with what a run executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub run_id: String,
    pub harness_version: String,
    pub engine_version: String,
    pub os: String,
    pub arch: String,
    pub cpu_count: Option<usize>,
    pub seed: u64,
    /// RFC 3339 wall-clock start time.
    pub started_at: String,
    pub started_unix_ms: u64,
}

impl EnvironmentSnapshot {
    #[must_use]
    pub fn capture(engine_version: impl Into<String>, seed: u64) -> Self {
        let started_unix_ms = crate::timing::unix_ms_now();
        Self {
            run_id: format!("run-{started_unix_ms}-{seed:016x}"),
            harness_version: env!("CARGO_PKG_VERSION").to_owned(),
            engine_version: engine_version.into(),
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            cpu_count: std::thread::available_parallelism().ok().map(usize::from),
            seed,
            started_at: chrono::Utc::now().to_rfc3339(),
            started_unix_ms,
        }
    }
}

/// The complete, ordered aggregate of one harness execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub schema_version: String,
    pub environment: EnvironmentSnapshot,
    /// In execution order.
    pub phases: Vec<PhaseMetrics>,
    pub terminal_error: Option<String>,
    pub total_elapsed_ms: f64,
    pub finished_unix_ms: Option<u64>,
}

impl RunResult {
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&PhaseMetrics> {
        self.phases.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    /// No terminal error and no failed phase.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.terminal_error.is_none() && self.phases.iter().all(PhaseMetrics::is_ok)
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds a [`RunResult`] incrementally across sequential phases.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    environment: EnvironmentSnapshot,
    phases: Vec<PhaseMetrics>,
    terminal_error: Option<String>,
    total_elapsed_ms: f64,
    finished_unix_ms: Option<u64>,
}

impl ResultAggregator {
    #[must_use]
    pub fn new(environment: EnvironmentSnapshot) -> Self {
        Self {
            environment,
            phases: Vec::new(),
            terminal_error: None,
            total_elapsed_ms: 0.0,
            finished_unix_ms: None,
        }
    }

    /// Record a phase under `name`.  A repeat call with the same name replaces
    /// the earlier entry in place, keeping its original position.
    pub fn record_phase(&mut self, name: &str, mut metrics: PhaseMetrics) {
        name.clone_into(&mut metrics.name);
        if let Some(slot) = self.phases.iter_mut().find(|p| p.name == name) {
            *slot = metrics;
        } else {
            self.phases.push(metrics);
        }
    }

    /// Record the error that ended the run.  The first one wins.
    pub fn set_terminal_error(&mut self, error: impl fmt::Display) {
        if self.terminal_error.is_none() {
            self.terminal_error = Some(error.to_string());
        }
    }

    pub fn finish(&mut self, total_elapsed_ms: f64, finished_unix_ms: u64) {
        self.total_elapsed_ms = total_elapsed_ms;
        self.finished_unix_ms = Some(finished_unix_ms);
    }

    #[must_use]
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    #[must_use]
    pub fn terminal_error(&self) -> Option<&str> {
        self.terminal_error.as_deref()
    }

    /// Snapshot of everything recorded so far.  Pure: repeated calls without
    /// an intervening mutation return identical results.
    #[must_use]
    pub fn summarize(&self) -> RunResult {
        RunResult {
            schema_version: RUN_RESULT_SCHEMA_V1.to_owned(),
            environment: self.environment.clone(),
            phases: self.phases.clone(),
            terminal_error: self.terminal_error.clone(),
            total_elapsed_ms: self.total_elapsed_ms,
            finished_unix_ms: self.finished_unix_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvironmentSnapshot {
        EnvironmentSnapshot::capture("sqlite test", 1)
    }

    fn worker(id: u16, completed: u64, failed: u64, wall_ms: f64) -> WorkerResult {
        WorkerResult {
            worker_id: id,
            attempted: completed + failed,
            completed,
            failed,
            started_unix_ms: 0,
            finished_unix_ms: 0,
            wall_time_ms: wall_ms,
            last_error: None,
        }
    }

    #[test]
    fn summarize_preserves_record_order() {
        let mut agg = ResultAggregator::new(env());
        for name in ["insert", "select", "update"] {
            agg.record_phase(name, PhaseMetrics::new("ignored"));
        }
        assert_eq!(agg.summarize().phase_names(), vec!["insert", "select", "update"]);
    }

    #[test]
    fn repeat_record_replaces_in_place() {
        let mut agg = ResultAggregator::new(env());
        agg.record_phase("insert", PhaseMetrics::new("insert"));
        agg.record_phase("select", PhaseMetrics::new("select"));
        let mut second = PhaseMetrics::new("insert");
        second.finish(10.0, 5);
        agg.record_phase("insert", second);

        let result = agg.summarize();
        assert_eq!(result.phase_names(), vec!["insert", "select"]);
        assert_eq!(result.phase("insert").unwrap().operations, 5);
    }

    #[test]
    fn summarize_is_idempotent() {
        let mut agg = ResultAggregator::new(env());
        let mut m = PhaseMetrics::new("insert");
        m.push_timing("single", 3.0, 3);
        m.set_counter("total_records", MetricValue::Count(3));
        agg.record_phase("insert", m);
        agg.set_terminal_error("connection_lost: gone");
        agg.finish(12.5, 99);

        let a = agg.summarize();
        let b = agg.summarize();
        assert_eq!(a, b);
        assert_eq!(a.to_pretty_json().unwrap(), b.to_pretty_json().unwrap());
    }

    #[test]
    fn first_terminal_error_wins() {
        let mut agg = ResultAggregator::new(env());
        agg.set_terminal_error("first");
        agg.set_terminal_error("second");
        assert_eq!(agg.terminal_error(), Some("first"));
        assert!(!agg.summarize().is_clean());
    }

    #[test]
    fn finish_derives_throughput_with_sentinel() {
        let mut m = PhaseMetrics::new("x");
        m.finish(0.0, 100);
        assert_eq!(m.ops_per_sec, 0.0);
        m.finish(500.0, 100);
        assert_eq!(m.ops_per_sec, 200.0);
        m.push_timing("empty", 10.0, 0);
        assert_eq!(m.timing("empty").unwrap().ops_per_sec, 0.0);
    }

    #[test]
    fn set_counter_replaces() {
        let mut m = PhaseMetrics::new("x");
        m.set_counter("rows", MetricValue::Count(1));
        m.set_counter("rows", MetricValue::Count(2));
        assert_eq!(m.counters.len(), 1);
        assert_eq!(m.counter("rows"), Some(&MetricValue::Count(2)));
    }

    #[test]
    fn percent_display() {
        assert_eq!(MetricValue::Percent(100.0).to_string(), "100.00%");
        assert_eq!(MetricValue::Percent(20.0).to_string(), "20.00%");
        assert_eq!(MetricValue::Bytes(200).to_string(), "200 B");
    }

    #[test]
    fn workers_fold_into_phase_metrics() {
        let workers = [
            worker(0, 4, 0, 100.0),
            worker(1, 4, 0, 200.0),
            worker(2, 4, 0, 300.0),
        ];
        let m = PhaseMetrics::from_workers("concurrency", &workers);
        assert_eq!(m.counter("total_operations"), Some(&MetricValue::Count(12)));
        assert_eq!(m.counter("total_errors"), Some(&MetricValue::Count(0)));
        assert_eq!(m.counter("success_rate").unwrap().to_string(), "100.00%");
        assert_eq!(m.counter("avg_worker_ms"), Some(&MetricValue::Millis(200.0)));
        assert_eq!(m.ops_per_sec, 60.0);
        assert_eq!(m.timings.len(), 3);
    }

    #[test]
    fn empty_pool_folds_to_zeroes() {
        let m = PhaseMetrics::from_workers("concurrency", &[]);
        assert_eq!(m.counter("success_rate").unwrap().to_string(), "0.00%");
        assert_eq!(m.ops_per_sec, 0.0);
    }

    #[test]
    fn run_result_json_roundtrip() {
        let mut agg = ResultAggregator::new(env());
        agg.record_phase("maintenance", PhaseMetrics::failed("m", 1.0, "io: eio"));
        let result = agg.summarize();
        let json = result.to_pretty_json().unwrap();
        let parsed: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
        assert_eq!(parsed.schema_version, RUN_RESULT_SCHEMA_V1);
    }
}
