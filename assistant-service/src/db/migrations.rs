//! Database schema migrations.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Run all database migrations.
///
/// Called during database initialization; every statement is idempotent.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- Chat users, registered on first contact
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            chat_id INTEGER NOT NULL,
            last_message TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- To-do items
        CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            due_date TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_todos_user ON todos(user_id);

        -- Cash-flow entries; amounts are exact decimal text
        CREATE TABLE IF NOT EXISTS finance_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            amount TEXT NOT NULL,
            category TEXT NOT NULL,
            kind TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_finance_entries_user ON finance_entries(user_id);

        -- Recurring payments; next_due_date is YYYY-MM-DD
        CREATE TABLE IF NOT EXISTS recurring_payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            amount TEXT NOT NULL,
            category TEXT NOT NULL,
            period TEXT NOT NULL,
            next_due_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recurring_payments_user ON recurring_payments(user_id);
        CREATE INDEX IF NOT EXISTS idx_recurring_payments_due ON recurring_payments(next_due_date);

        -- Installment credits
        CREATE TABLE IF NOT EXISTS credits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            principal TEXT NOT NULL,
            annual_rate TEXT NOT NULL,
            months INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_credits_user ON credits(user_id);
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('users', 'todos', 'finance_entries', 'recurring_payments', 'credits')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }
}
