//! SQLite persistence for monitors and transition results.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::Target;
use crate::models::{CheckResult, Monitor};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS monitor (
  id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
  name TEXT UNIQUE,
  method TEXT,
  url TEXT,
  follow INTEGER
);
CREATE TABLE IF NOT EXISTS result (
  id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
  checked_at TIMESTAMP,
  status TEXT,
  reason TEXT,
  monitor_id INTEGER,
  FOREIGN KEY(monitor_id) REFERENCES monitor(id)
);
";

/// Where workers record transition results.
pub trait ResultSink: Send + Sync {
    fn create_result(&self, result: &CheckResult) -> StoreResult<i64>;
}

/// Shared handle to the database; clones use the same connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> StoreResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut *conn)?)
    }

    pub fn get_monitors(&self) -> StoreResult<Vec<Monitor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, method, url, follow FROM monitor ORDER BY id")?;
            let rows = stmt.query_map([], monitor_from_row)?;
            rows.collect()
        })
    }

    pub fn get_monitor_by_name(&self, name: &str) -> StoreResult<Option<Monitor>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, method, url, follow FROM monitor WHERE name = ?1",
                [name],
                monitor_from_row,
            )
            .optional()
        })
    }

    pub fn create_monitors(&self, targets: &[Target]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO monitor(name, method, url, follow) VALUES (?1, ?2, ?3, ?4)")?;
                for t in targets {
                    stmt.execute(params![t.name, t.method, t.url, t.follow])?;
                }
            }
            tx.commit()
        })
    }

    /// Inserts targets not stored yet and returns the configured ones with
    /// their ids, in configuration order.
    ///
    /// Targets are matched by name; a stored monitor keeps the method, url and
    /// follow flag it was first created with.
    pub fn sync_monitors(&self, targets: &[Target]) -> StoreResult<Vec<Monitor>> {
        let mut missing = Vec::new();
        for target in targets {
            if self.get_monitor_by_name(&target.name)?.is_none() {
                missing.push(target.clone());
            }
        }
        self.create_monitors(&missing)?;

        let mut monitors = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(monitor) = self.get_monitor_by_name(&target.name)? {
                monitors.push(monitor);
            }
        }
        Ok(monitors)
    }

    pub fn get_results(&self, monitor_id: i64) -> StoreResult<Vec<CheckResult>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, checked_at, status, reason, monitor_id FROM result WHERE monitor_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([monitor_id], |row| {
                Ok(CheckResult {
                    id: row.get(0)?,
                    checked_at: row.get(1)?,
                    status: row.get(2)?,
                    reason: row.get(3)?,
                    monitor_id: row.get(4)?,
                })
            })?;
            rows.collect()
        })
    }
}

impl ResultSink for Store {
    fn create_result(&self, result: &CheckResult) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO result(checked_at, status, reason, monitor_id) VALUES (?1, ?2, ?3, ?4)",
                params![result.checked_at, result.status, result.reason, result.monitor_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

fn monitor_from_row(row: &Row<'_>) -> rusqlite::Result<Monitor> {
    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        follow: row.get(4)?,
    })
}
