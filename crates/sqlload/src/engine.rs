//! The narrow storage-engine interface the harness drives.
//!
//! Phases only ever talk to a [`StorageEngine`]; workers obtain their own
//! engine through an [`EngineConnector`], so no connection is ever shared
//! between threads.

use std::fmt;

use rusqlite::ffi::ErrorCode;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// A single SQL value, as bound into statements and read out of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Integer view of the value; reals are truncated, everything else is `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Float view of the value; integers are widened, everything else is `None`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Integer(i) => Self::Integer(i),
            Value::Real(f) => Self::Real(f),
            Value::Text(s) => Self::Text(s),
            Value::Blob(b) => Self::Blob(b),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// One result row, columns in select-list order.
pub type Row = Vec<SqlValue>;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

// ── Errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// Lock contention (`SQLITE_BUSY` / `SQLITE_LOCKED`).
    Busy,
    /// Constraint violation (unique, not-null, check, foreign key).
    Constraint,
    /// Transient I/O failure or full disk.
    Io,
    /// The database file is damaged or is not a database.
    Corrupt,
    /// The connection can no longer be used.
    ConnectionLost,
    Other,
}

impl StorageErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Constraint => "constraint",
            Self::Io => "io",
            Self::Corrupt => "corrupt",
            Self::ConnectionLost => "connection_lost",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed storage operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    #[must_use]
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the error invalidates the engine itself, as opposed to the one
    /// operation that raised it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            StorageErrorKind::Corrupt | StorageErrorKind::ConnectionLost
        )
    }
}

fn classify_error_code(code: ErrorCode) -> StorageErrorKind {
    match code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageErrorKind::Busy,
        ErrorCode::ConstraintViolation => StorageErrorKind::Constraint,
        ErrorCode::SystemIoFailure | ErrorCode::DiskFull => StorageErrorKind::Io,
        ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => StorageErrorKind::Corrupt,
        ErrorCode::CannotOpen | ErrorCode::PermissionDenied => StorageErrorKind::ConnectionLost,
        _ => StorageErrorKind::Other,
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        let kind = match &err {
            rusqlite::Error::SqliteFailure(e, _) => classify_error_code(e.code),
            _ => StorageErrorKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

// ── Traits ─────────────────────────────────────────────────────────────

/// A transactional datastore that executes statements and returns rows.
pub trait StorageEngine {
    /// Run a statement that does not return rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<ExecOutcome, StorageError>;

    /// Run a statement and collect every row it returns.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StorageError>;

    fn begin(&mut self) -> Result<(), StorageError>;
    fn commit(&mut self) -> Result<(), StorageError>;
    fn rollback(&mut self) -> Result<(), StorageError>;

    /// Refresh the planner's statistics (`ANALYZE`).
    fn reindex_statistics(&mut self) -> Result<(), StorageError>;

    /// Give free pages back to the filesystem (`VACUUM`).
    fn reclaim_space(&mut self) -> Result<(), StorageError>;

    /// Current size of the database, in bytes.
    fn storage_size(&mut self) -> Result<u64, StorageError>;

    /// Version string for the environment snapshot.
    fn engine_version(&self) -> String;
}

/// Opens independent engine handles onto one underlying database.
///
/// The connector is shared by reference across worker threads; each call to
/// [`EngineConnector::connect`] must produce a handle nobody else holds.
pub trait EngineConnector: Sync {
    type Engine: StorageEngine;

    fn connect(&self) -> Result<Self::Engine, StorageError>;

    /// Remove transient artifacts owned by this connector.  Called exactly
    /// once per run, after every handle has been dropped.
    fn cleanup(&self) -> std::io::Result<()> {
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Run `body` inside an explicit transaction.
///
/// Commits when `body` succeeds; rolls back and returns the body's error
/// otherwise.  A failed rollback is ignored in favour of the original error.
pub fn with_transaction<E, T, F>(engine: &mut E, body: F) -> Result<T, StorageError>
where
    E: StorageEngine + ?Sized,
    F: FnOnce(&mut E) -> Result<T, StorageError>,
{
    engine.begin()?;
    match body(engine) {
        Ok(value) => match engine.commit() {
            Ok(()) => Ok(value),
            Err(err) => {
                let _ = engine.rollback();
                Err(err)
            }
        },
        Err(err) => {
            let _ = engine.rollback();
            Err(err)
        }
    }
}

/// First column of the first row as an integer, or 0 when absent.
pub fn query_scalar_i64<E>(engine: &mut E, sql: &str, params: &[SqlValue]) -> Result<i64, StorageError>
where
    E: StorageEngine + ?Sized,
{
    let rows = engine.query(sql, params)?;
    Ok(rows
        .first()
        .and_then(|row| row.first())
        .and_then(SqlValue::as_i64)
        .unwrap_or(0))
}
