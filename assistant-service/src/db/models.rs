//! Database model structs.
//!
//! This module contains the data structures for database records.

use std::str::FromStr;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Chat user identifier; private chats share the id with the user
pub type UserId = i64;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Completion status for to-do items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    Done,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "done" => TodoStatus::Done,
            _ => TodoStatus::Pending,
        }
    }
}

/// To-do item record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
}

impl TodoItem {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let due_date_str: Option<String> = row.get(4)?;
        let status_str: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            due_date: due_date_str
                .map(|s| parse_date_column(4, &s))
                .transpose()?,
            status: TodoStatus::from_str(&status_str),
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Fields needed to create a to-do item
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
}

/// Direction of a cash-flow entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Some(EntryKind::Income),
            "expense" => Some(EntryKind::Expense),
            _ => None,
        }
    }
}

/// Cash-flow entry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceEntry {
    pub id: i64,
    pub user_id: UserId,
    pub amount: Decimal,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl FinanceEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let amount_str: String = row.get(2)?;
        let kind_str: String = row.get(4)?;
        let created_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: parse_decimal_column(2, &amount_str)?,
            category: row.get(3)?,
            kind: EntryKind::parse(&kind_str).ok_or_else(|| {
                corrupt_column(4, format!("unknown entry kind '{}'", kind_str))
            })?,
            note: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Fields needed to create a cash-flow entry
#[derive(Debug, Clone)]
pub struct NewFinanceEntry {
    pub user_id: UserId,
    pub amount: Decimal,
    pub category: String,
    pub kind: EntryKind,
    pub note: String,
}

/// Totals over a user's cash-flow entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinanceStats {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub balance: Decimal,
    pub transactions: usize,
}

impl FinanceStats {
    pub fn from_entries(entries: &[FinanceEntry]) -> Self {
        let mut stats = FinanceStats {
            transactions: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            match entry.kind {
                EntryKind::Income => stats.total_income += entry.amount,
                EntryKind::Expense => stats.total_expense += entry.amount,
            }
        }
        stats.balance = stats.total_income - stats.total_expense;
        stats
    }
}

/// Cadence of a recurring payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Some(Period::Daily),
            "weekly" => Some(Period::Weekly),
            "monthly" => Some(Period::Monthly),
            "yearly" => Some(Period::Yearly),
            _ => None,
        }
    }

    /// The due date one period after `date`.
    ///
    /// Calendar months and years clamp to the last day of a shorter target
    /// month (Jan 31 + 1 month = Feb 28/29).
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Daily => date.checked_add_days(Days::new(1)),
            Period::Weekly => date.checked_add_days(Days::new(7)),
            Period::Monthly => date.checked_add_months(Months::new(1)),
            Period::Yearly => date.checked_add_months(Months::new(12)),
        }
    }
}

/// Recurring payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringPayment {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub amount: Decimal,
    pub category: String,
    pub period: Period,
    pub next_due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl RecurringPayment {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let amount_str: String = row.get(3)?;
        let period_str: String = row.get(5)?;
        let next_due_str: String = row.get(6)?;
        let created_at_str: String = row.get(7)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            amount: parse_decimal_column(3, &amount_str)?,
            category: row.get(4)?,
            period: Period::parse(&period_str)
                .ok_or_else(|| corrupt_column(5, format!("unknown period '{}'", period_str)))?,
            next_due_date: parse_date_column(6, &next_due_str)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Fields needed to create a recurring payment
#[derive(Debug, Clone)]
pub struct NewRecurringPayment {
    pub user_id: UserId,
    pub title: String,
    pub amount: Decimal,
    pub category: String,
    pub period: Period,
    pub next_due_date: NaiveDate,
}

/// Installment credit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub principal: Decimal,
    pub annual_rate_percent: Decimal,
    pub months: u32,
    pub created_at: DateTime<Utc>,
}

impl Credit {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let principal_str: String = row.get(3)?;
        let rate_str: String = row.get(4)?;
        let created_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            principal: parse_decimal_column(3, &principal_str)?,
            annual_rate_percent: parse_decimal_column(4, &rate_str)?,
            months: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Fields needed to create a credit
#[derive(Debug, Clone)]
pub struct NewCredit {
    pub user_id: UserId,
    pub title: String,
    pub principal: Decimal,
    pub annual_rate_percent: Decimal,
    pub months: u32,
}

// ==================== Column helpers ====================

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date_column(idx: usize, s: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_decimal_column(idx: usize, s: &str) -> Result<Decimal, rusqlite::Error> {
    Decimal::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn corrupt_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_advance() {
        let start = date(2025, 1, 31);
        assert_eq!(Period::Daily.advance(start), Some(date(2025, 2, 1)));
        assert_eq!(Period::Weekly.advance(start), Some(date(2025, 2, 7)));
        assert_eq!(Period::Monthly.advance(start), Some(date(2025, 2, 28)));
        assert_eq!(Period::Yearly.advance(date(2024, 2, 29)), Some(date(2025, 2, 28)));
    }

    #[test]
    fn test_period_parse() {
        assert_eq!(Period::parse(" Weekly "), Some(Period::Weekly));
        assert_eq!(Period::parse("fortnightly"), None);
        assert_eq!(EntryKind::parse("EXPENSE"), Some(EntryKind::Expense));
    }

    #[test]
    fn test_finance_stats() {
        let entry = |amount, kind| FinanceEntry {
            id: 0,
            user_id: 1,
            amount,
            category: "misc".to_string(),
            kind,
            note: String::new(),
            created_at: Utc::now(),
        };
        let entries = vec![
            entry(dec("1000.50"), EntryKind::Income),
            entry(dec("200.25"), EntryKind::Expense),
            entry(dec("0.25"), EntryKind::Expense),
        ];

        let stats = FinanceStats::from_entries(&entries);
        assert_eq!(stats.total_income, dec("1000.50"));
        assert_eq!(stats.total_expense, dec("200.50"));
        assert_eq!(stats.balance, dec("800.00"));
        assert_eq!(stats.transactions, 3);
    }

    #[test]
    fn test_finance_entry_serializes_kind_as_type() {
        let entry = FinanceEntry {
            id: 3,
            user_id: 9,
            amount: dec("12.30"),
            category: "food".to_string(),
            kind: EntryKind::Expense,
            note: String::new(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "expense");
        assert_eq!(json["amount"], "12.30");
    }
}
