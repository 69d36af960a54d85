//! Workload shape and engine knobs.
//!
//! A [`WorkloadSpec`] is the single source of truth for every quantity the
//! harness uses: record counts, batch sizes, worker counts, value ranges and
//! vocabularies.  Nothing is hard-coded in the phases; they read from here.
//!
//! Documents are JSON.  Every section is `#[serde(default)]`, so a partial
//! document only overrides the keys it names:
//!
//! ```json
//! { "seed": 7, "concurrency": { "workers": 8 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::DEFAULT_SEED;

/// A malformed workload document.  Reported once, before any phase starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("vocabulary `{field}` is empty")]
    EmptyVocabulary { field: &'static str },

    #[error("range `{field}` is inverted or non-finite: min={min}, max={max}")]
    InvertedRange {
        field: &'static str,
        min: String,
        max: String,
    },

    #[error("`{field}` must be greater than zero")]
    ZeroQuantity { field: &'static str },

    #[error("`{field}` is invalid: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

// ── Ranges ─────────────────────────────────────────────────────────────

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

impl IntRange {
    #[must_use]
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    fn check(self, field: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                field,
                min: self.min.to_string(),
                max: self.max.to_string(),
            });
        }
        Ok(())
    }
}

/// Half-open floating-point range (`min == max` is allowed and yields `min`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn check(self, field: &'static str) -> Result<(), ConfigError> {
        // Sampling needs a finite span as well as finite bounds.
        if !self.min.is_finite()
            || !self.max.is_finite()
            || self.min > self.max
            || !(self.max - self.min).is_finite()
        {
            return Err(ConfigError::InvertedRange {
                field,
                min: self.min.to_string(),
                max: self.max.to_string(),
            });
        }
        Ok(())
    }
}

// ── Sections ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertSpec {
    /// Total number of user rows the insert phase creates.
    pub test_records: u64,
    /// How many of `test_records` are inserted one statement at a time.
    pub single_inserts: u64,
    /// Rows per transaction for the batched remainder.
    pub batch_size: u64,
}

impl Default for InsertSpec {
    fn default() -> Self {
        Self {
            test_records: 10_000,
            single_inserts: 1_000,
            batch_size: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectSpec {
    /// Row limit for the unrestricted scan.
    pub scan_limit: u64,
    /// Row limit for the grouped join.
    pub join_limit: u64,
}

impl Default for SelectSpec {
    fn default() -> Self {
        Self {
            scan_limit: 100,
            join_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSpec {
    /// Row updates issued one statement (one implicit transaction) each.
    pub single_updates: u64,
    /// Row updates issued inside one explicit transaction.
    pub batch_updates: u64,
    /// The bulk update deactivates every user older than this.
    pub bulk_min_age: i64,
}

impl Default for UpdateSpec {
    fn default() -> Self {
        Self {
            single_updates: 500,
            batch_updates: 1_000,
            bulk_min_age: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteSpec {
    /// Disposable rows created up front so deletes have targets.
    pub disposable_rows: u64,
    /// Rows deleted one statement at a time before the bulk delete.
    pub single_deletes: u64,
}

impl Default for DeleteSpec {
    fn default() -> Self {
        Self {
            disposable_rows: 1_000,
            single_deletes: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSpec {
    /// Rows written inside the committed transaction.
    pub committed_rows: u64,
    /// Rows written and then rolled back.
    pub rollback_writes: u64,
}

impl Default for TransactionSpec {
    fn default() -> Self {
        Self {
            committed_rows: 1_000,
            rollback_writes: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTypeSpec {
    /// Length of the oversized text entry, in characters.
    pub large_text_len: usize,
    /// Length of the oversized blob entry, in bytes.
    pub large_blob_len: usize,
}

impl Default for DataTypeSpec {
    fn default() -> Self {
        Self {
            large_text_len: 100_000,
            large_blob_len: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySpec {
    pub workers: u16,
    pub operations_per_worker: u64,
    /// Worker progress is logged every this many iterations (0 disables).
    pub progress_interval: u64,
    /// Factor applied to the row value by each worker's update step.
    pub update_factor: f64,
}

impl Default for ConcurrencySpec {
    fn default() -> Self {
        Self {
            workers: 4,
            operations_per_worker: 250,
            progress_interval: 50,
            update_factor: 1.1,
        }
    }
}

/// Ranges and vocabularies the value generator draws from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueRanges {
    pub age: IntRange,
    pub salary: FloatRange,
    pub amount: FloatRange,
    pub concurrent_value: FloatRange,
    pub first_names: Vec<String>,
    pub last_names: Vec<String>,
    pub cities: Vec<String>,
    pub email_domains: Vec<String>,
    pub transaction_types: Vec<String>,
    pub transaction_statuses: Vec<String>,
    pub log_levels: Vec<String>,
    pub log_messages: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for ValueRanges {
    fn default() -> Self {
        Self {
            age: IntRange::new(18, 80),
            salary: FloatRange::new(30_000.0, 150_000.0),
            amount: FloatRange::new(1.0, 5_000.0),
            concurrent_value: FloatRange::new(0.0, 1_000.0),
            first_names: words(&[
                "Alice", "Bob", "Carol", "David", "Erin", "Frank", "Grace", "Heidi", "Ivan",
                "Judy",
            ]),
            last_names: words(&[
                "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
            ]),
            cities: words(&[
                "Berlin", "Lisbon", "Osaka", "Toronto", "Nairobi", "Lima", "Oslo", "Austin",
            ]),
            email_domains: words(&["example.com", "example.org", "example.net"]),
            transaction_types: words(&["deposit", "withdrawal", "transfer", "payment"]),
            transaction_statuses: words(&["pending", "completed", "failed"]),
            log_levels: words(&["DEBUG", "INFO", "WARN", "ERROR"]),
            log_messages: words(&[
                "request served",
                "cache miss",
                "connection reset",
                "slow query detected",
                "user login",
            ]),
        }
    }
}

impl ValueRanges {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.age.check("values.age")?;
        self.salary.check("values.salary")?;
        self.amount.check("values.amount")?;
        self.concurrent_value.check("values.concurrent_value")?;

        let vocabularies: [(&'static str, &Vec<String>); 8] = [
            ("values.first_names", &self.first_names),
            ("values.last_names", &self.last_names),
            ("values.cities", &self.cities),
            ("values.email_domains", &self.email_domains),
            ("values.transaction_types", &self.transaction_types),
            ("values.transaction_statuses", &self.transaction_statuses),
            ("values.log_levels", &self.log_levels),
            ("values.log_messages", &self.log_messages),
        ];
        for (field, list) in vocabularies {
            if list.is_empty() {
                return Err(ConfigError::EmptyVocabulary { field });
            }
        }
        Ok(())
    }
}

/// PRAGMA-level knobs applied identically to the primary connection and every
/// worker connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Journal mode: `"wal"`, `"delete"`, `"truncate"`, `"memory"`.
    pub journal_mode: String,
    /// Synchronous level: `"OFF"`, `"NORMAL"`, `"FULL"`, `"EXTRA"`.
    pub synchronous: String,
    /// Page cache size.  Negative = KiB, positive = pages (SQLite semantics).
    pub cache_size: i64,
    /// Busy timeout in milliseconds for lock contention between workers.
    pub busy_timeout_ms: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            journal_mode: "wal".to_owned(),
            synchronous: "NORMAL".to_owned(),
            cache_size: -8000,
            busy_timeout_ms: 5000,
        }
    }
}

const JOURNAL_MODES: &[&str] = &["delete", "truncate", "persist", "memory", "wal", "off"];
const SYNCHRONOUS_LEVELS: &[&str] = &["off", "normal", "full", "extra"];

impl EngineSettings {
    /// PRAGMA statements executed once per connection after it is opened.
    #[must_use]
    pub fn to_pragmas(&self) -> Vec<String> {
        vec![
            format!("PRAGMA busy_timeout={};", self.busy_timeout_ms),
            format!("PRAGMA journal_mode={};", self.journal_mode),
            format!("PRAGMA synchronous={};", self.synchronous),
            format!("PRAGMA cache_size={};", self.cache_size),
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !JOURNAL_MODES.contains(&self.journal_mode.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidSetting {
                field: "engine.journal_mode",
                reason: format!("unknown journal mode `{}`", self.journal_mode),
            });
        }
        if !SYNCHRONOUS_LEVELS.contains(&self.synchronous.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidSetting {
                field: "engine.synchronous",
                reason: format!("unknown synchronous level `{}`", self.synchronous),
            });
        }
        Ok(())
    }
}

// ── Top-level spec ─────────────────────────────────────────────────────

/// Immutable description of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSpec {
    pub seed: u64,
    /// Single-row loops log progress every this many rows (0 disables).
    pub progress_interval: u64,
    pub insert: InsertSpec,
    pub select: SelectSpec,
    pub update: UpdateSpec,
    pub delete: DeleteSpec,
    pub transaction: TransactionSpec,
    pub datatype: DataTypeSpec,
    pub concurrency: ConcurrencySpec,
    pub values: ValueRanges,
    pub engine: EngineSettings,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            progress_interval: 1_000,
            insert: InsertSpec::default(),
            select: SelectSpec::default(),
            update: UpdateSpec::default(),
            delete: DeleteSpec::default(),
            transaction: TransactionSpec::default(),
            datatype: DataTypeSpec::default(),
            concurrency: ConcurrencySpec::default(),
            values: ValueRanges::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl WorkloadSpec {
    /// Load a workload document, falling back to built-in defaults when the
    /// source is missing or unparseable.
    ///
    /// The resulting spec is validated; a semantically malformed spec (empty
    /// vocabulary, inverted range, zero batch size) is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let spec = match path {
            None => {
                info!("no workload document given, using built-in defaults");
                Self::default()
            }
            Some(path) => match std::fs::read_to_string(path) {
                Ok(raw) => Self::from_json_or_default(&raw, path),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "workload document unreadable, using defaults");
                    Self::default()
                }
            },
        };
        spec.validate()?;
        Ok(spec)
    }

    fn from_json_or_default(raw: &str, path: &Path) -> Self {
        match serde_json::from_str::<Self>(raw) {
            Ok(spec) => {
                info!(path = %path.display(), "loaded workload document");
                spec
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "workload document invalid, using defaults");
                Self::default()
            }
        }
    }

    /// Number of rows the insert phase writes through batches.
    #[must_use]
    pub fn batched_rows(&self) -> u64 {
        self.insert
            .test_records
            .saturating_sub(self.insert.single_inserts)
    }

    /// Number of full batches the insert phase executes.
    #[must_use]
    pub fn insert_batches(&self) -> u64 {
        self.batched_rows()
            .checked_div(self.insert.batch_size)
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.insert.batch_size == 0 {
            return Err(ConfigError::ZeroQuantity {
                field: "insert.batch_size",
            });
        }
        if self.insert.single_inserts > self.insert.test_records {
            return Err(ConfigError::InvalidSetting {
                field: "insert.single_inserts",
                reason: format!(
                    "{} exceeds insert.test_records={}",
                    self.insert.single_inserts, self.insert.test_records
                ),
            });
        }
        if self.concurrency.workers == 0 {
            return Err(ConfigError::ZeroQuantity {
                field: "concurrency.workers",
            });
        }
        if !self.concurrency.update_factor.is_finite() {
            return Err(ConfigError::InvalidSetting {
                field: "concurrency.update_factor",
                reason: "must be finite".to_owned(),
            });
        }

        self.values.validate()?;
        self.engine.validate()
    }
}
