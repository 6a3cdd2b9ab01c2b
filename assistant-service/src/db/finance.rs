//! Cash-flow entry operations.

use chrono::Utc;
use rusqlite::params;

use super::Database;
use super::models::{FinanceEntry, NewFinanceEntry, UserId};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Record a cash-flow entry and return the stored record
    pub fn create_finance_entry(&self, entry: &NewFinanceEntry) -> ServiceResult<FinanceEntry> {
        let conn = self.conn()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO finance_entries (user_id, amount, category, kind, note, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.user_id,
                entry.amount.to_string(),
                entry.category,
                entry.kind.as_str(),
                entry.note,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(FinanceEntry {
            id: conn.last_insert_rowid(),
            user_id: entry.user_id,
            amount: entry.amount,
            category: entry.category.clone(),
            kind: entry.kind,
            note: entry.note.clone(),
            created_at,
        })
    }

    /// List a user's cash-flow entries, newest first
    pub fn list_finance_entries(&self, user_id: UserId) -> ServiceResult<Vec<FinanceEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, amount, category, kind, note, created_at \
                 FROM finance_entries WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id], FinanceEntry::from_row)
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
    use crate::db::EntryKind;

    #[test]
    fn test_amounts_round_trip_exactly() {
        let db = Database::open_in_memory().unwrap();
        let amount = Decimal::from_str("1999.50").unwrap();

        db.create_finance_entry(&NewFinanceEntry {
            user_id: 5,
            amount,
            category: "rent".to_string(),
            kind: EntryKind::Expense,
            note: String::new(),
        })
        .unwrap();

        let entries = db.list_finance_entries(5).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, amount);
        assert_eq!(entries[0].kind, EntryKind::Expense);
        assert!(db.list_finance_entries(6).unwrap().is_empty());
    }
}
