//! Chat user registration.

use chrono::Utc;
use rusqlite::params;

use super::Database;
use super::models::UserId;
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Insert a user on first contact, or refresh chat id and last message
    pub fn register_user(
        &self,
        user_id: UserId,
        chat_id: i64,
        last_message: &str,
    ) -> ServiceResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO users (id, chat_id, last_message, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(id) DO UPDATE SET
                chat_id = excluded.chat_id,
                last_message = excluded.last_message,
                updated_at = excluded.updated_at
            "#,
            params![user_id, chat_id, last_message, now],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Insert a user keyed by id, keeping any existing row untouched.
    /// Private chats share their id with the user.
    pub fn ensure_user(&self, user_id: UserId) -> ServiceResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR IGNORE INTO users (id, chat_id, last_message, created_at, updated_at) \
             VALUES (?1, ?1, '', ?2, ?2)",
            params![user_id, now],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Check whether a user has ever been registered
    pub fn user_exists(&self, user_id: UserId) -> ServiceResult<bool> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_user_is_upsert() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.user_exists(42).unwrap());

        db.register_user(42, 42, "/start").unwrap();
        db.register_user(42, 42, "Tasks").unwrap();

        assert!(db.user_exists(42).unwrap());
        db.ensure_user(42).unwrap();
        let conn = db.conn().unwrap();
        let last: String = conn
            .query_row("SELECT last_message FROM users WHERE id = 42", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(last, "Tasks");
    }
}
