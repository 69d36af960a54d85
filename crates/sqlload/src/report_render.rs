//! Report rendering: [`RunResult`] -> JSON and a human-readable Markdown
//! summary.
//!
//! ## Usage
//!
//! ```text
//! let mut writer = ReportWriter::new("reports/");
//! writer.consume(&result)?;          // reports/report.json + reports/report.md
//! println!("{}", render_markdown(&result));
//! ```

use std::fmt::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::LoadResult;
use crate::metrics::{PhaseMetrics, RunResult};

/// File name of the JSON report inside a [`ReportWriter`] directory.
pub const JSON_REPORT_FILE: &str = "report.json";
/// File name of the Markdown report inside a [`ReportWriter`] directory.
pub const MARKDOWN_REPORT_FILE: &str = "report.md";

/// Something that takes a finished run's result.
pub trait ResultConsumer {
    fn consume(&mut self, result: &RunResult) -> LoadResult<()>;
}

/// Parse a JSON document produced by [`RunResult::to_pretty_json`].
pub fn parse_run_result(json: &str) -> LoadResult<RunResult> {
    Ok(serde_json::from_str(json)?)
}

// ── Markdown ───────────────────────────────────────────────────────────

/// Render a run into a Markdown document: environment, per-phase summary
/// table, then one section per phase with its stage timings and counters.
#[must_use]
pub fn render_markdown(result: &RunResult) -> String {
    let mut out = String::with_capacity(4096);
    let env = &result.environment;

    let _ = writeln!(out, "# Load Run Report\n");
    let _ = writeln!(out, "## Environment\n");
    let _ = writeln!(out, "- **Run:** `{}`", env.run_id);
    let _ = writeln!(out, "- **Harness:** {}", env.harness_version);
    let _ = writeln!(out, "- **Engine:** {}", env.engine_version);
    let _ = writeln!(out, "- **Platform:** {}/{}", env.os, env.arch);
    if let Some(cpus) = env.cpu_count {
        let _ = writeln!(out, "- **CPUs:** {cpus}");
    }
    let _ = writeln!(out, "- **Seed:** {}", env.seed);
    let _ = writeln!(out, "- **Started:** {}", env.started_at);
    let _ = writeln!(out, "- **Total time:** {:.2} ms", result.total_elapsed_ms);
    let _ = writeln!(out);

    match &result.terminal_error {
        Some(err) => {
            let _ = writeln!(out, "> **Run aborted:** {err}\n");
        }
        None if !result.is_clean() => {
            let _ = writeln!(out, "> Completed with phase failures.\n");
        }
        None => {}
    }

    let _ = writeln!(out, "## Summary\n");
    if result.phases.is_empty() {
        let _ = writeln!(out, "_No phases ran._");
        return out;
    }
    let _ = writeln!(out, "| Phase | Status | Time (ms) | Operations | Ops/s |");
    let _ = writeln!(out, "|-------|--------|----------:|-----------:|------:|");
    for phase in &result.phases {
        let status = if phase.is_ok() { "ok" } else { "FAILED" };
        let _ = writeln!(
            out,
            "| {} | {status} | {:.2} | {} | {:.1} |",
            phase.name, phase.elapsed_ms, phase.operations, phase.ops_per_sec
        );
    }
    let _ = writeln!(out);

    for phase in &result.phases {
        render_phase(&mut out, phase);
    }
    out
}

fn render_phase(out: &mut String, phase: &PhaseMetrics) {
    let _ = writeln!(out, "### {}\n", phase.name);
    if let Some(err) = &phase.error {
        let _ = writeln!(out, "**Error:** {err}\n");
    }
    if !phase.timings.is_empty() {
        let _ = writeln!(out, "| Stage | Time (ms) | Operations | Ops/s |");
        let _ = writeln!(out, "|-------|----------:|-----------:|------:|");
        for t in &phase.timings {
            let _ = writeln!(
                out,
                "| {} | {:.2} | {} | {:.1} |",
                t.label, t.elapsed_ms, t.operations, t.ops_per_sec
            );
        }
        let _ = writeln!(out);
    }
    for c in &phase.counters {
        let _ = writeln!(out, "- `{}`: {}", c.name, c.value);
    }
    if !phase.counters.is_empty() {
        let _ = writeln!(out);
    }
}

// ── Writer ─────────────────────────────────────────────────────────────

/// Writes `report.json` and `report.md` into a directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn json_path(&self) -> PathBuf {
        self.dir.join(JSON_REPORT_FILE)
    }

    #[must_use]
    pub fn markdown_path(&self) -> PathBuf {
        self.dir.join(MARKDOWN_REPORT_FILE)
    }
}

impl ResultConsumer for ReportWriter {
    fn consume(&mut self, result: &RunResult) -> LoadResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json_path = self.json_path();
        std::fs::write(&json_path, result.to_pretty_json()?)?;
        let md_path = self.markdown_path();
        std::fs::write(&md_path, render_markdown(result))?;
        info!(
            json = %json_path.display(),
            markdown = %md_path.display(),
            "reports written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{EnvironmentSnapshot, MetricValue, ResultAggregator};

    fn sample() -> RunResult {
        let mut agg = ResultAggregator::new(EnvironmentSnapshot::capture("sqlite 3.46.0", 42));
        let mut insert = PhaseMetrics::new("insert");
        insert.push_timing("single_inserts", 10.0, 5);
        insert.set_counter("total_records", MetricValue::Count(10));
        insert.finish(20.0, 10);
        agg.record_phase("insert", insert);
        agg.record_phase("select", PhaseMetrics::failed("select", 1.5, "busy: locked"));
        agg.finish(25.0, 1);
        agg.summarize()
    }

    #[test]
    fn markdown_has_summary_row_per_phase() {
        let md = render_markdown(&sample());
        assert!(md.starts_with("# Load Run Report"));
        assert!(md.contains("| insert | ok | 20.00 | 10 | 500.0 |"));
        assert!(md.contains("| select | FAILED |"));
        assert!(md.contains("**Error:** busy: locked"));
        assert!(md.contains("- `total_records`: 10"));
        assert!(md.contains("Completed with phase failures."));
    }

    #[test]
    fn writer_emits_parseable_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path().join("out"));
        let result = sample();
        writer.consume(&result).unwrap();

        let json = std::fs::read_to_string(writer.json_path()).unwrap();
        assert_eq!(parse_run_result(&json).unwrap(), result);
        let md = std::fs::read_to_string(writer.markdown_path()).unwrap();
        assert!(md.contains("## Summary"));
    }

    #[test]
    fn empty_run_renders_placeholder() {
        let mut agg = ResultAggregator::new(EnvironmentSnapshot::capture("unknown", 1));
        agg.set_terminal_error("initialize: connection_lost: cannot open");
        let md = render_markdown(&agg.summarize());
        assert!(md.contains("**Run aborted:** initialize:"));
        assert!(md.contains("_No phases ran._"));
    }
}
