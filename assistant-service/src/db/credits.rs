//! Credit operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Credit, NewCredit, UserId};
use crate::error::{DatabaseError, ServiceResult};

const CREDIT_COLUMNS: &str = "id, user_id, title, principal, annual_rate, months, created_at";

impl Database {
    /// Create a credit and return the stored record
    pub fn create_credit(&self, credit: &NewCredit) -> ServiceResult<Credit> {
        let conn = self.conn()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO credits (user_id, title, principal, annual_rate, months, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                credit.user_id,
                credit.title,
                credit.principal.to_string(),
                credit.annual_rate_percent.to_string(),
                credit.months,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(Credit {
            id: conn.last_insert_rowid(),
            user_id: credit.user_id,
            title: credit.title.clone(),
            principal: credit.principal,
            annual_rate_percent: credit.annual_rate_percent,
            months: credit.months,
            created_at,
        })
    }

    /// List a user's credits, oldest first
    pub fn list_credits(&self, user_id: UserId) -> ServiceResult<Vec<Credit>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credits WHERE user_id = ?1 ORDER BY id",
                CREDIT_COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id], Credit::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Get a credit if it belongs to the user
    pub fn get_credit(&self, id: i64, user_id: UserId) -> ServiceResult<Option<Credit>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM credits WHERE id = ?1 AND user_id = ?2",
                CREDIT_COLUMNS
            ),
            params![id, user_id],
            Credit::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Delete a credit owned by the user. Returns whether a row was removed.
    pub fn delete_credit(&self, id: i64, user_id: UserId) -> ServiceResult<bool> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "DELETE FROM credits WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}
