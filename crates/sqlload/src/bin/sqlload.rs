//! sqlload — phase-ordered load and correctness run against SQLite.
//!
//! Runs insert, select, update, delete, transaction, datatype, concurrency,
//! maintenance and statistics phases against one database file, then prints
//! a Markdown summary and optionally writes `report.json` / `report.md`.
//!
//! Exit codes: `0` the run completed (phase failures are in the report), `1`
//! the run was aborted by a fatal error, `2` usage or workload errors.

use std::ffi::OsString;
use std::path::PathBuf;

use sqlload::LoadResult;
use sqlload::config::WorkloadSpec;
use sqlload::logging::init_tracing;
use sqlload::metrics::RunResult;
use sqlload::orchestrator::PhaseOrchestrator;
use sqlload::report_render::{ReportWriter, ResultConsumer, render_markdown};
use sqlload::sqlite_engine::SqliteConnector;
use sqlload::workspace::RunWorkspace;

fn main() {
    let exit_code = run_cli(std::env::args_os());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    output: Option<PathBuf>,
    seed: Option<u64>,
    workers: Option<u16>,
    ops_per_worker: Option<u64>,
    records: Option<u64>,
    keep_db: bool,
    verbosity: u8,
}

fn run_cli<I>(os_args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let raw: Vec<String> = os_args
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    // Skip program name (raw[0]).
    let tail = if raw.len() > 1 { &raw[1..] } else { &[] };

    if tail.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return 0;
    }

    let opts = match parse_options(tail) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            print_help();
            return 2;
        }
    };

    init_tracing(opts.verbosity);

    let (result, workspace) = match load_and_run(&opts) {
        Ok(run) => run,
        Err(err) => {
            eprintln!("error: {err}");
            return 2;
        }
    };

    println!("{}", render_markdown(&result));
    if opts.keep_db && workspace.is_temporary() {
        eprintln!("warning: --keep-db has no effect without --db; the temporary directory is removed on exit");
    } else if opts.keep_db {
        println!("database kept at {}", workspace.db_path().display());
    }

    if let Some(dir) = &opts.output {
        let mut writer = ReportWriter::new(dir);
        if let Err(err) = writer.consume(&result) {
            eprintln!("error: writing reports to {}: {err}", dir.display());
            return 1;
        }
        println!("reports written to {}", dir.display());
    }

    i32::from(result.terminal_error.is_some())
}

/// Load the workload, pick the database location and run every phase.
///
/// The returned workspace owns any temporary directory; drop it after the
/// result has been reported.
fn load_and_run(opts: &CliOptions) -> LoadResult<(RunResult, RunWorkspace)> {
    let mut spec = WorkloadSpec::load_or_default(opts.config.as_deref())?;
    apply_overrides(&mut spec, opts);

    let workspace = RunWorkspace::new(opts.db.as_deref())?;
    let connector = SqliteConnector::new(workspace.db_path(), spec.engine.clone())
        .remove_on_cleanup(!opts.keep_db);

    let result = PhaseOrchestrator::new(connector, spec).run()?;
    Ok((result, workspace))
}

fn parse_options(argv: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut i = 0;
    while i < argv.len() {
        let flag = argv[i].as_str();
        match flag {
            "--keep-db" => opts.keep_db = true,
            "-v" | "--verbose" => opts.verbosity = opts.verbosity.saturating_add(1),
            "-vv" => opts.verbosity = opts.verbosity.saturating_add(2),
            "--config" | "--db" | "--output" | "--seed" | "--workers" | "--ops-per-worker"
            | "--records" => {
                i += 1;
                let Some(value) = argv.get(i) else {
                    return Err(format!("{flag} requires an argument"));
                };
                match flag {
                    "--config" => opts.config = Some(PathBuf::from(value)),
                    "--db" => opts.db = Some(PathBuf::from(value)),
                    "--output" => opts.output = Some(PathBuf::from(value)),
                    "--seed" => opts.seed = Some(parse_number(flag, value)?),
                    "--workers" => opts.workers = Some(parse_number(flag, value)?),
                    "--ops-per-worker" => opts.ops_per_worker = Some(parse_number(flag, value)?),
                    _ => opts.records = Some(parse_number(flag, value)?),
                }
            }
            other => return Err(format!("unknown option `{other}`")),
        }
        i += 1;
    }
    Ok(opts)
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid integer for {flag}: `{value}`"))
}

/// CLI flags win over the workload document.  `--records` also caps the
/// single-insert count so the spec stays valid.
fn apply_overrides(spec: &mut WorkloadSpec, opts: &CliOptions) {
    if let Some(seed) = opts.seed {
        spec.seed = seed;
    }
    if let Some(workers) = opts.workers {
        spec.concurrency.workers = workers;
    }
    if let Some(ops) = opts.ops_per_worker {
        spec.concurrency.operations_per_worker = ops;
    }
    if let Some(records) = opts.records {
        spec.insert.test_records = records;
        spec.insert.single_inserts = spec.insert.single_inserts.min(records);
    }
}

fn print_help() {
    let text = "\
sqlload — Phase-ordered load and correctness run against SQLite

USAGE:
    sqlload [OPTIONS]

OPTIONS:
    --config <PATH>          Workload document (JSON); defaults are used if absent
    --db <PATH>              Database file (default: a temporary directory)
    --output <DIR>           Write report.json and report.md into DIR
    --seed <N>               Base RNG seed
    --workers <N>            Concurrency-phase worker count
    --ops-per-worker <N>     Iterations per concurrency worker
    --records <N>            Total users written by the insert phase
    --keep-db                Do not delete the database after the run
    -v, --verbose            More logging (repeatable; RUST_LOG overrides)
    -h, --help               Show this help message

EXIT CODES:
    0    run completed
    1    run aborted by a fatal storage error, or reports could not be written
    2    usage or workload error

EXAMPLES:
    sqlload
    sqlload --records 2000 --workers 8 --ops-per-worker 100
    sqlload --config workload.json --db bench.db --keep-db --output reports/
";
    print!("{text}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn parses_all_value_flags() {
        let opts = parse_options(&args(&[
            "--seed",
            "7",
            "--workers",
            "3",
            "--ops-per-worker",
            "9",
            "--records",
            "50",
            "--keep-db",
            "-v",
        ]))
        .unwrap();
        assert_eq!(opts.seed, Some(7));
        assert_eq!(opts.workers, Some(3));
        assert_eq!(opts.ops_per_worker, Some(9));
        assert_eq!(opts.records, Some(50));
        assert!(opts.keep_db);
        assert_eq!(opts.verbosity, 1);
    }

    #[test]
    fn rejects_missing_value_and_unknown_flag() {
        assert!(parse_options(&args(&["--seed"])).is_err());
        assert!(parse_options(&args(&["--workers", "many"])).is_err());
        assert!(parse_options(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn records_override_caps_single_inserts() {
        let mut spec = WorkloadSpec::default();
        let opts = CliOptions {
            records: Some(10),
            ..CliOptions::default()
        };
        apply_overrides(&mut spec, &opts);
        assert_eq!(spec.insert.test_records, 10);
        assert_eq!(spec.insert.single_inserts, 10);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn malformed_workload_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("bad.json");
        std::fs::write(&config, r#"{ "values": { "cities": [] } }"#).unwrap();
        let opts = CliOptions {
            config: Some(config),
            ..CliOptions::default()
        };

        let err = load_and_run(&opts).unwrap_err();
        assert!(matches!(err, sqlload::LoadError::Config(_)));
        assert!(err.to_string().starts_with("config: "));
    }

    #[test]
    fn help_exits_zero() {
        assert_eq!(run_cli(["sqlload", "--help"].map(OsString::from)), 0);
    }

    #[test]
    fn bad_flag_exits_two() {
        assert_eq!(run_cli(["sqlload", "--nope"].map(OsString::from)), 2);
    }
}
