//! C SQLite (rusqlite, bundled libsqlite3) implementation of
//! [`StorageEngine`].
//!
//! One [`SqliteEngine`] wraps one `rusqlite::Connection`.  The
//! [`SqliteConnector`] opens a fresh connection per call, so each worker in
//! the concurrency phase owns its handle outright.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::config::EngineSettings;
use crate::engine::{EngineConnector, ExecOutcome, Row, SqlValue, StorageEngine, StorageError};
use crate::workspace::remove_database_files;

/// Statement cache capacity per connection; the phases use a small fixed set
/// of statements.
const STATEMENT_CACHE_CAPACITY: usize = 64;

pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    /// Open (or create) the database at `path` and apply the PRAGMA settings.
    pub fn open(path: &Path, settings: &EngineSettings) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, settings)
    }

    /// Private in-memory database; useful for single-connection phases in tests.
    pub fn open_in_memory(settings: &EngineSettings) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, settings)
    }

    fn with_connection(conn: Connection, settings: &EngineSettings) -> Result<Self, StorageError> {
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        apply_pragmas(&conn, &settings.to_pragmas())?;
        Ok(Self { conn })
    }
}

fn apply_pragmas(conn: &Connection, pragmas: &[String]) -> Result<(), rusqlite::Error> {
    for p in pragmas {
        // `journal_mode` returns a row; execute_batch discards it.
        conn.execute_batch(p)?;
    }
    Ok(())
}

impl StorageEngine for SqliteEngine {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<ExecOutcome, StorageError> {
        let affected = {
            let mut stmt = self.conn.prepare_cached(sql)?;
            stmt.execute(params_from_iter(params.iter()))?
        };
        Ok(ExecOutcome {
            last_insert_id: self.conn.last_insert_rowid(),
            rows_affected: affected as u64,
        })
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value: rusqlite::types::Value = row.get(idx)?;
                values.push(SqlValue::from(value));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn reindex_statistics(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("ANALYZE")?;
        Ok(())
    }

    fn reclaim_space(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("VACUUM")?;
        // In WAL mode the shrunken image only reaches the main file after a
        // checkpoint; harmless in other journal modes.
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn storage_size(&mut self) -> Result<u64, StorageError> {
        let page_count: i64 = self.conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = self.conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        Ok(page_count.max(0) as u64 * page_size.max(0) as u64)
    }

    fn engine_version(&self) -> String {
        format!("sqlite {}", rusqlite::version())
    }
}

/// Opens [`SqliteEngine`] handles onto one database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    settings: EngineSettings,
    remove_on_cleanup: bool,
}

impl SqliteConnector {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, settings: EngineSettings) -> Self {
        Self {
            path: path.into(),
            settings,
            remove_on_cleanup: false,
        }
    }

    /// Delete the database file and its sidecars when the run is cleaned up.
    #[must_use]
    pub fn remove_on_cleanup(mut self, remove: bool) -> Self {
        self.remove_on_cleanup = remove;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EngineConnector for SqliteConnector {
    type Engine = SqliteEngine;

    fn connect(&self) -> Result<SqliteEngine, StorageError> {
        debug!(path = %self.path.display(), "opening connection");
        SqliteEngine::open(&self.path, &self.settings)
    }

    fn cleanup(&self) -> std::io::Result<()> {
        if self.remove_on_cleanup {
            remove_database_files(&self.path)?;
        }
        Ok(())
    }
}
