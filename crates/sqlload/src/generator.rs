//! Seeded synthetic record generation.
//!
//! A [`ValueGenerator`] draws every field uniformly from the configured
//! [`ValueRanges`].  Record *shape* is fixed (same field set on every call);
//! only values vary.  The only state is the RNG, so two generators built from
//! the same ranges and seed produce identical streams.

use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::config::{ConfigError, DataTypeSpec, FloatRange, IntRange, ValueRanges};
use crate::engine::SqlValue;

/// A row for the `users` table.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i64,
    pub city: String,
    pub salary: f64,
    pub is_active: bool,
    pub metadata: String,
    pub created_at: String,
}

impl UserRecord {
    /// Bind order for [`crate::schema::INSERT_USER`].
    #[must_use]
    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.first_name.as_str()),
            SqlValue::from(self.last_name.as_str()),
            SqlValue::from(self.email.as_str()),
            SqlValue::Integer(self.age),
            SqlValue::from(self.city.as_str()),
            SqlValue::Real(self.salary),
            SqlValue::from(self.is_active),
            SqlValue::from(self.metadata.as_str()),
            SqlValue::from(self.created_at.as_str()),
        ]
    }
}

/// A row for the `transactions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub user_id: i64,
    pub amount: f64,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub created_at: String,
}

impl TransactionRecord {
    /// Bind order for [`crate::schema::INSERT_TRANSACTION`].
    #[must_use]
    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.user_id),
            SqlValue::Real(self.amount),
            SqlValue::from(self.kind.as_str()),
            SqlValue::from(self.status.as_str()),
            SqlValue::from(self.description.as_str()),
            SqlValue::from(self.created_at.as_str()),
        ]
    }
}

/// A row for the `logs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    pub source: String,
    pub payload: String,
    pub created_at: String,
}

impl LogRecord {
    /// Bind order for [`crate::schema::INSERT_LOG`].
    #[must_use]
    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.level.as_str()),
            SqlValue::from(self.message.as_str()),
            SqlValue::from(self.source.as_str()),
            SqlValue::from(self.payload.as_str()),
            SqlValue::from(self.created_at.as_str()),
        ]
    }
}

/// One entry of the value-type repertoire written by the datatype phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedEntry {
    pub type_name: &'static str,
    pub value: SqlValue,
}

/// A row written by one concurrency-phase worker iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentRow {
    pub worker_id: u16,
    /// Unique across all workers of a run.
    pub op_key: String,
    pub data: String,
    pub value: f64,
}

impl ConcurrentRow {
    /// Bind order for [`crate::schema::INSERT_CONCURRENT`].
    #[must_use]
    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(i64::from(self.worker_id)),
            SqlValue::from(self.op_key.as_str()),
            SqlValue::from(self.data.as_str()),
            SqlValue::Real(self.value),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ValueGenerator {
    ranges: ValueRanges,
    rng: StdRng,
}

impl ValueGenerator {
    /// Build a generator over `ranges`, seeded with `seed`.
    ///
    /// Fails if a vocabulary is empty or a range is inverted.
    pub fn new(ranges: &ValueRanges, seed: u64) -> Result<Self, ConfigError> {
        ranges.validate()?;
        Ok(Self {
            ranges: ranges.clone(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// A generator over the same ranges with a fresh RNG stream.
    #[must_use]
    pub fn reseeded(&self, seed: u64) -> Self {
        Self {
            ranges: self.ranges.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn int_in(&mut self, range: IntRange) -> i64 {
        self.rng.gen_range(range.min..=range.max)
    }

    fn float_in(&mut self, range: FloatRange) -> f64 {
        if range.min >= range.max {
            return range.min;
        }
        let raw = self.rng.gen_range(range.min..range.max);
        (raw * 100.0).round() / 100.0
    }

    fn pick(rng: &mut StdRng, list: &[String]) -> String {
        list.choose(rng).cloned().unwrap_or_default()
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// A user row.  `index` makes the e-mail address unique within a run.
    pub fn user(&mut self, index: u64) -> UserRecord {
        let first_name = Self::pick(&mut self.rng, &self.ranges.first_names);
        let last_name = Self::pick(&mut self.rng, &self.ranges.last_names);
        let domain = Self::pick(&mut self.rng, &self.ranges.email_domains);
        let email = format!(
            "{}.{}.{index}@{domain}",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        );
        let age = self.int_in(self.ranges.age);
        let city = Self::pick(&mut self.rng, &self.ranges.cities);
        let salary = self.float_in(self.ranges.salary);
        let is_active = self.rng.gen_bool(0.8);
        let metadata = json!({
            "signup_index": index,
            "newsletter": self.rng.gen_bool(0.5),
            "score": self.rng.gen_range(0..=100),
        })
        .to_string();

        UserRecord {
            first_name,
            last_name,
            email,
            age,
            city,
            salary,
            is_active,
            metadata,
            created_at: Self::now(),
        }
    }

    /// A transaction row owned by `user_id`.
    pub fn transaction(&mut self, user_id: i64) -> TransactionRecord {
        let amount = self.float_in(self.ranges.amount);
        let kind = Self::pick(&mut self.rng, &self.ranges.transaction_types);
        let status = Self::pick(&mut self.rng, &self.ranges.transaction_statuses);
        TransactionRecord {
            user_id,
            amount,
            description: format!("{kind} of {amount:.2}"),
            kind,
            status,
            created_at: Self::now(),
        }
    }

    /// A log row tagged with `source`.
    pub fn log(&mut self, source: &str) -> LogRecord {
        let level = Self::pick(&mut self.rng, &self.ranges.log_levels);
        let message = Self::pick(&mut self.rng, &self.ranges.log_messages);
        let payload = json!({
            "request_id": self.rng.r#gen::<u32>(),
            "latency_ms": self.rng.gen_range(0..2_000),
        })
        .to_string();
        LogRecord {
            level,
            message,
            source: source.to_owned(),
            payload,
            created_at: Self::now(),
        }
    }

    /// A user id drawn uniformly from `1..=max_id` (or 1 when `max_id < 1`).
    pub fn user_id(&mut self, max_id: i64) -> i64 {
        if max_id <= 1 {
            return 1;
        }
        self.rng.gen_range(1..=max_id)
    }

    /// A value drawn from the age range, used as a predicate bound.
    pub fn age(&mut self) -> i64 {
        self.int_in(self.ranges.age)
    }

    /// A salary drawn from the salary range.
    pub fn salary(&mut self) -> f64 {
        self.float_in(self.ranges.salary)
    }

    /// A city drawn from the city vocabulary.
    pub fn city(&mut self) -> String {
        Self::pick(&mut self.rng, &self.ranges.cities)
    }

    /// A first name drawn from the first-name vocabulary.
    pub fn first_name(&mut self) -> String {
        Self::pick(&mut self.rng, &self.ranges.first_names)
    }

    /// The row a worker writes on iteration `op`.
    pub fn concurrent_row(&mut self, worker_id: u16, op: u64) -> ConcurrentRow {
        let value = self.float_in(self.ranges.concurrent_value);
        let tag: u32 = self.rng.r#gen();
        ConcurrentRow {
            worker_id,
            op_key: format!("w{worker_id}-op{op}"),
            data: format!("worker {worker_id} op {op} tag {tag:08x}"),
            value,
        }
    }

    /// The full value-type repertoire: one entry per storage class plus the
    /// oversized text/blob variants.
    pub fn typed_entries(&mut self, spec: &DataTypeSpec) -> Vec<TypedEntry> {
        let mut blob = vec![0_u8; 256];
        self.rng.fill(blob.as_mut_slice());
        let large_blob: Vec<u8> = (0..spec.large_blob_len)
            .map(|i| u8::try_from(i % 251).unwrap_or(0))
            .collect();
        let structured = json!({
            "nested": { "list": [1, 2, 3], "flag": true },
            "name": self.first_name(),
        })
        .to_string();

        vec![
            TypedEntry {
                type_name: "integer",
                value: SqlValue::Integer(self.rng.gen_range(i64::MIN / 2..i64::MAX / 2)),
            },
            TypedEntry {
                type_name: "real",
                value: SqlValue::Real(self.salary()),
            },
            TypedEntry {
                type_name: "text",
                value: SqlValue::from("héllo wörld — 你好世界 🚀"),
            },
            TypedEntry {
                type_name: "blob",
                value: SqlValue::Blob(blob),
            },
            TypedEntry {
                type_name: "null",
                value: SqlValue::Null,
            },
            TypedEntry {
                type_name: "boolean",
                value: SqlValue::from(self.rng.gen_bool(0.5)),
            },
            TypedEntry {
                type_name: "timestamp",
                value: SqlValue::Text(Self::now()),
            },
            TypedEntry {
                type_name: "json",
                value: SqlValue::Text(structured),
            },
            TypedEntry {
                type_name: "large_text",
                value: SqlValue::Text("x".repeat(spec.large_text_len)),
            },
            TypedEntry {
                type_name: "large_blob",
                value: SqlValue::Blob(large_blob),
            },
        ]
    }
}
