//! Benchmark tables and the statements shared between phases.
//!
//! [`initialize`] drops and recreates every table, so each run starts from an
//! empty database regardless of what a previous run left behind.

use crate::engine::{StorageEngine, StorageError};

/// Every table the harness owns, in creation order.
pub const TABLES: &[&str] = &["users", "transactions", "logs", "data_types", "concurrent_test"];

const CREATE_STATEMENTS: &[&str] = &[
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        age INTEGER,
        city TEXT,
        salary REAL,
        is_active INTEGER NOT NULL DEFAULT 1,
        metadata TEXT,
        created_at TEXT,
        updated_at TEXT
    )",
    "CREATE INDEX idx_users_city ON users(city)",
    "CREATE TABLE transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        amount REAL NOT NULL,
        kind TEXT,
        status TEXT,
        description TEXT,
        created_at TEXT
    )",
    "CREATE INDEX idx_transactions_user ON transactions(user_id)",
    "CREATE TABLE logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        level TEXT,
        message TEXT,
        source TEXT,
        payload TEXT,
        created_at TEXT
    )",
    "CREATE INDEX idx_logs_source ON logs(source)",
    // `value` has no declared type so every storage class round-trips as-is.
    "CREATE TABLE data_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type_name TEXT NOT NULL,
        value
    )",
    "CREATE TABLE concurrent_test (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        worker_id INTEGER NOT NULL,
        op_key TEXT NOT NULL UNIQUE,
        data TEXT,
        value REAL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT
    )",
    "CREATE INDEX idx_concurrent_worker ON concurrent_test(worker_id)",
];

pub const INSERT_USER: &str = "INSERT INTO users \
    (first_name, last_name, email, age, city, salary, is_active, metadata, created_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

pub const INSERT_TRANSACTION: &str = "INSERT INTO transactions \
    (user_id, amount, kind, status, description, created_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

pub const INSERT_LOG: &str = "INSERT INTO logs \
    (level, message, source, payload, created_at) \
    VALUES (?1, ?2, ?3, ?4, ?5)";

pub const INSERT_CONCURRENT: &str = "INSERT INTO concurrent_test \
    (worker_id, op_key, data, value) VALUES (?1, ?2, ?3, ?4)";

pub const UPDATE_CONCURRENT_VALUE: &str = "UPDATE concurrent_test \
    SET value = value * ?1, updated_at = CURRENT_TIMESTAMP WHERE op_key = ?2";

pub const SELECT_CONCURRENT_BY_KEY: &str =
    "SELECT id, worker_id, op_key, data, value FROM concurrent_test WHERE op_key = ?1";

pub const MAX_USER_ID: &str = "SELECT COALESCE(MAX(id), 0) FROM users";

/// Drop and recreate every table and index.
pub fn initialize<E: StorageEngine + ?Sized>(engine: &mut E) -> Result<(), StorageError> {
    for table in TABLES.iter().rev() {
        engine.execute(&format!("DROP TABLE IF EXISTS {table}"), &[])?;
    }
    for ddl in CREATE_STATEMENTS {
        engine.execute(ddl, &[])?;
    }
    Ok(())
}
