//! Shared fixtures for the integration tests: a fault-injecting engine
//! wrapper and a connector that counts cleanups.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use sqlload::config::{EngineSettings, WorkloadSpec};
use sqlload::engine::{
    EngineConnector, ExecOutcome, Row, SqlValue, StorageEngine, StorageError, StorageErrorKind,
};
use sqlload::sqlite_engine::{SqliteConnector, SqliteEngine};

/// What to do when a statement matches a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Fail(StorageErrorKind),
    Panic,
}

/// Trigger `action` on every statement containing `needle`.
#[derive(Debug, Clone)]
pub struct Fault {
    pub needle: &'static str,
    pub action: FaultAction,
}

impl Fault {
    pub fn fail(needle: &'static str, kind: StorageErrorKind) -> Self {
        Self {
            needle,
            action: FaultAction::Fail(kind),
        }
    }

    pub fn panic(needle: &'static str) -> Self {
        Self {
            needle,
            action: FaultAction::Panic,
        }
    }
}

pub struct FaultyEngine {
    inner: SqliteEngine,
    fault: Option<Fault>,
}

impl FaultyEngine {
    fn check(&self, sql: &str) -> Result<(), StorageError> {
        match &self.fault {
            Some(fault) if sql.contains(fault.needle) => match fault.action {
                FaultAction::Fail(kind) => {
                    Err(StorageError::new(kind, format!("injected fault on `{}`", fault.needle)))
                }
                FaultAction::Panic => panic!("injected panic on `{}`", fault.needle),
            },
            _ => Ok(()),
        }
    }
}

impl StorageEngine for FaultyEngine {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<ExecOutcome, StorageError> {
        self.check(sql)?;
        self.inner.execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StorageError> {
        self.check(sql)?;
        self.inner.query(sql, params)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.inner.rollback()
    }

    fn reindex_statistics(&mut self) -> Result<(), StorageError> {
        self.check("ANALYZE")?;
        self.inner.reindex_statistics()
    }

    fn reclaim_space(&mut self) -> Result<(), StorageError> {
        self.check("VACUUM")?;
        self.inner.reclaim_space()
    }

    fn storage_size(&mut self) -> Result<u64, StorageError> {
        self.inner.storage_size()
    }

    fn engine_version(&self) -> String {
        format!("faulty {}", self.inner.engine_version())
    }
}

/// Wraps a [`SqliteConnector`], injecting an optional fault into every
/// connection and counting `connect`/`cleanup` calls.
pub struct CountingConnector {
    inner: SqliteConnector,
    fault: Option<Fault>,
    refuse_connect: bool,
    fail_connect_at: Option<usize>,
    connects: AtomicUsize,
    cleanups: AtomicUsize,
}

impl CountingConnector {
    pub fn new(path: &Path) -> Self {
        Self {
            inner: SqliteConnector::new(path, EngineSettings::default()).remove_on_cleanup(true),
            fault: None,
            refuse_connect: false,
            fail_connect_at: None,
            connects: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Every `connect` fails as if the database could not be opened.
    pub fn refusing(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Only the `nth` call to `connect` (1-based, the primary connection
    /// included) fails.
    pub fn failing_connect(mut self, nth: usize) -> Self {
        self.fail_connect_at = Some(nth);
        self
    }

    pub fn path(&self) -> PathBuf {
        self.inner.path().to_path_buf()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

impl EngineConnector for CountingConnector {
    type Engine = FaultyEngine;

    fn connect(&self) -> Result<FaultyEngine, StorageError> {
        let call = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_connect_at == Some(call) {
            return Err(StorageError::new(
                StorageErrorKind::Io,
                format!("connect #{call} failed"),
            ));
        }
        if self.refuse_connect {
            return Err(StorageError::new(
                StorageErrorKind::ConnectionLost,
                "connection refused",
            ));
        }
        Ok(FaultyEngine {
            inner: self.inner.connect()?,
            fault: self.fault.clone(),
        })
    }

    fn cleanup(&self) -> std::io::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        self.inner.cleanup()
    }
}

/// A workload small enough for every phase to finish in well under a second.
pub fn small_spec() -> WorkloadSpec {
    let mut spec = WorkloadSpec::default();
    spec.insert.test_records = 60;
    spec.insert.single_inserts = 10;
    spec.insert.batch_size = 25;
    spec.update.single_updates = 10;
    spec.update.batch_updates = 10;
    spec.delete.disposable_rows = 20;
    spec.delete.single_deletes = 5;
    spec.transaction.committed_rows = 15;
    spec.datatype.large_text_len = 2_048;
    spec.datatype.large_blob_len = 2_048;
    spec.concurrency.workers = 3;
    spec.concurrency.operations_per_worker = 10;
    spec.concurrency.progress_interval = 0;
    spec
}
