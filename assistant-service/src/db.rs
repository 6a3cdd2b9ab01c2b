//! Database module for SQLite operations.
//!
//! This module provides the `Database` struct and all database operations
//! organized into submodules by domain. Every operation is scoped by owner
//! except the system-wide recurring payment scan used by the scheduler.

mod credits;
mod finance;
mod migrations;
pub mod models;
mod recurring;
mod todos;
mod users;

pub use models::{
    Credit, EntryKind, FinanceEntry, FinanceStats, NewCredit, NewFinanceEntry,
    NewRecurringPayment, NewTodo, Period, RecurringPayment, TodoItem, TodoStatus, UserId,
};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{DatabaseError, ServiceError, ServiceResult};

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ServiceError::Database(DatabaseError::Connection(
                    rusqlite::Error::ToSqlConversionFailure(Box::new(e)),
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> ServiceResult<Self> {
        // Run all migrations
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> ServiceResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ServiceError::Database(DatabaseError::Poisoned))
    }
}

#[cfg(test)]
impl Database {
    /// Run raw SQL against the connection, e.g. to install failing triggers
    pub fn execute_batch(&self, sql: &str) -> ServiceResult<()> {
        self.conn()?
            .execute_batch(sql)
            .map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Block the calling thread while holding the connection for `duration`.
    /// `locked` fires once the connection is held.
    pub fn stall(&self, duration: std::time::Duration, locked: std::sync::mpsc::Sender<()>) {
        let Ok(_conn) = self.conn() else {
            return;
        };
        let _ = locked.send(());
        std::thread::sleep(duration);
    }
}
