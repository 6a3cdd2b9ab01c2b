//! Recurring payment operations.

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{NewRecurringPayment, RecurringPayment, UserId, format_date};
use crate::error::{DatabaseError, ServiceResult};

const RECURRING_COLUMNS: &str =
    "id, user_id, title, amount, category, period, next_due_date, created_at";

impl Database {
    /// Create a recurring payment and return the stored record
    pub fn create_recurring(&self, payment: &NewRecurringPayment) -> ServiceResult<RecurringPayment> {
        let conn = self.conn()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO recurring_payments \
             (user_id, title, amount, category, period, next_due_date, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payment.user_id,
                payment.title,
                payment.amount.to_string(),
                payment.category,
                payment.period.as_str(),
                format_date(payment.next_due_date),
                created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(RecurringPayment {
            id: conn.last_insert_rowid(),
            user_id: payment.user_id,
            title: payment.title.clone(),
            amount: payment.amount,
            category: payment.category.clone(),
            period: payment.period,
            next_due_date: payment.next_due_date,
            created_at,
        })
    }

    /// List a user's recurring payments, soonest due first
    pub fn list_recurring(&self, user_id: UserId) -> ServiceResult<Vec<RecurringPayment>> {
        self.query_recurring(
            &format!(
                "SELECT {} FROM recurring_payments WHERE user_id = ?1 ORDER BY next_due_date, id",
                RECURRING_COLUMNS
            ),
            params![user_id],
        )
    }

    /// List every user's recurring payments. Used by the system-wide scheduler.
    pub fn list_all_recurring(&self) -> ServiceResult<Vec<RecurringPayment>> {
        self.query_recurring(
            &format!(
                "SELECT {} FROM recurring_payments ORDER BY next_due_date, id",
                RECURRING_COLUMNS
            ),
            params![],
        )
    }

    /// Get a recurring payment if it belongs to the user
    pub fn get_recurring(
        &self,
        id: i64,
        user_id: UserId,
    ) -> ServiceResult<Option<RecurringPayment>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM recurring_payments WHERE id = ?1 AND user_id = ?2",
                RECURRING_COLUMNS
            ),
            params![id, user_id],
            RecurringPayment::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Delete a recurring payment owned by the user. Returns whether a row was removed.
    pub fn delete_recurring(&self, id: i64, user_id: UserId) -> ServiceResult<bool> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "DELETE FROM recurring_payments WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Move a payment's next due date forward
    pub fn update_next_due_date(&self, id: i64, next_due_date: NaiveDate) -> ServiceResult<()> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "UPDATE recurring_payments SET next_due_date = ?1 WHERE id = ?2",
                params![format_date(next_due_date), id],
            )
            .map_err(DatabaseError::Query)?;

        if rows == 0 {
            return Err(crate::error::ServiceError::NotFound {
                entity: "Recurring payment",
                id,
            });
        }

        Ok(())
    }

    fn query_recurring(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> ServiceResult<Vec<RecurringPayment>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(sql).map_err(DatabaseError::Query)?;
        let rows = stmt
            .query_map(params, RecurringPayment::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::db::Period;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(user_id: UserId, title: &str, due: NaiveDate) -> NewRecurringPayment {
        NewRecurringPayment {
            user_id,
            title: title.to_string(),
            amount: Decimal::from_str("9.99").unwrap(),
            category: "subscriptions".to_string(),
            period: Period::Monthly,
            next_due_date: due,
        }
    }

    #[test]
    fn test_list_all_spans_users() {
        let db = Database::open_in_memory().unwrap();
        db.create_recurring(&payment(2, "Cloud", date(2025, 4, 1))).unwrap();
        db.create_recurring(&payment(1, "Music", date(2025, 3, 1))).unwrap();
        db.create_recurring(&payment(2, "Video", date(2025, 3, 10))).unwrap();

        let all = db.list_all_recurring().unwrap();
        let titles: Vec<_> = all.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Music", "Video", "Cloud"]);
        assert_eq!(db.list_recurring(1).unwrap().len(), 1);
        assert_eq!(db.list_recurring(2).unwrap().len(), 2);
    }

    #[test]
    fn test_update_next_due_date() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_recurring(&payment(1, "Gym", date(2025, 1, 31))).unwrap();

        db.update_next_due_date(created.id, date(2025, 2, 28)).unwrap();
        let stored = db.get_recurring(created.id, 1).unwrap().unwrap();
        assert_eq!(stored.next_due_date, date(2025, 2, 28));

        assert!(db.update_next_due_date(999, date(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_delete_recurring_is_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_recurring(&payment(1, "Gym", date(2025, 1, 31))).unwrap();

        assert!(!db.delete_recurring(created.id, 2).unwrap());
        assert!(db.delete_recurring(created.id, 1).unwrap());
        assert!(db.get_recurring(created.id, 1).unwrap().is_none());
    }
}
