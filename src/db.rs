//! Local SQLite database for workstation state.
//!
//! Holds the login marker and the persisted receipt number sequence.
//! Everything else lives in the remote store.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::AdminError;

pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: Option<PathBuf>,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/admin.db`.
///
/// On open failure, deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, AdminError> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join("admin.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| AdminError::Local(format!("open failed after retry: {e}")))?
        }
    };

    run_migrations(&conn)?;
    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: Some(db_path),
    })
}

/// In-memory database, used for offline dry runs and tests.
pub fn open_in_memory() -> Result<DbState, AdminError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: None,
    })
}

fn open_and_configure(path: &Path) -> Result<Connection, AdminError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<(), AdminError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// v1: key/value settings (login marker).
fn migrate_v1(conn: &Connection) -> Result<(), AdminError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS local_settings (
            category TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (category, key)
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    Ok(())
}

/// v2: persisted receipt numbers, one per order.
fn migrate_v2(conn: &Connection) -> Result<(), AdminError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS order_numbers (
            order_id TEXT PRIMARY KEY,
            number INTEGER NOT NULL UNIQUE,
            assigned_at TEXT NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT value FROM local_settings WHERE category = ?1 AND key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), AdminError> {
    conn.execute(
        "INSERT INTO local_settings (category, key, value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(category, key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

pub fn delete_settings(conn: &Connection, category: &str) -> Result<(), AdminError> {
    conn.execute(
        "DELETE FROM local_settings WHERE category = ?1",
        params![category],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Receipt numbers
// ---------------------------------------------------------------------------

/// Return the receipt number of `order_id`, assigning the next one if the
/// order has none yet.
pub fn assign_order_number(conn: &mut Connection, order_id: &str) -> Result<i64, AdminError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing: Option<i64> = tx
        .query_row(
            "SELECT number FROM order_numbers WHERE order_id = ?1",
            params![order_id],
            |row| row.get(0),
        )
        .optional()?;
    let number = match existing {
        Some(n) => n,
        None => {
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(number), 0) + 1 FROM order_numbers",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO order_numbers (order_id, number, assigned_at) VALUES (?1, ?2, ?3)",
                params![order_id, next, Utc::now().to_rfc3339()],
            )?;
            next
        }
    };
    tx.commit()?;
    Ok(number)
}

pub fn lookup_order_number(conn: &Connection, order_id: &str) -> Option<i64> {
    conn.query_row(
        "SELECT number FROM order_numbers WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )
    .ok()
}
