//! Credit payment schedules.
//!
//! Pure functions over exact decimals. Every monetary value is rounded to
//! cents with [`RoundingStrategy::MidpointAwayFromZero`], and the last row
//! always takes the whole remaining balance so the principal parts add up
//! to the borrowed amount exactly.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Repayment scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Level total payment every month
    #[default]
    Annuity,
    /// Level principal part, interest on the shrinking balance
    Differentiated,
}

impl ScheduleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "annuity" | "ann" => Some(ScheduleKind::Annuity),
            "differentiated" | "diff" => Some(ScheduleKind::Differentiated),
            _ => None,
        }
    }
}

/// One month of a payment schedule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRow {
    pub due_date: NaiveDate,
    pub principal_part: Decimal,
    pub interest_part: Decimal,
    pub total: Decimal,
    pub remaining_balance: Decimal,
}

/// Inputs shared by both schemes
#[derive(Debug, Clone, Copy)]
pub struct LoanTerms {
    pub principal: Decimal,
    pub annual_rate_percent: Decimal,
    pub months: u32,
    pub start: NaiveDate,
    /// Day of month payments fall on; `None` or 0 keeps the start date's day
    pub billing_day: Option<u32>,
}

/// Build the schedule for `terms` using the given scheme
pub fn schedule(kind: ScheduleKind, terms: &LoanTerms) -> Result<Vec<PaymentRow>, ScheduleError> {
    match kind {
        ScheduleKind::Annuity => annuity_schedule(terms),
        ScheduleKind::Differentiated => differentiated_schedule(terms),
    }
}

/// Equal monthly payments
pub fn annuity_schedule(terms: &LoanTerms) -> Result<Vec<PaymentRow>, ScheduleError> {
    validate(terms)?;
    let rate = monthly_rate(terms.annual_rate_percent)?;
    let level = level_payment(terms.principal, rate, terms.months)?;

    build_rows(terms, rate, |interest| level - interest)
}

/// Equal principal parts
pub fn differentiated_schedule(terms: &LoanTerms) -> Result<Vec<PaymentRow>, ScheduleError> {
    validate(terms)?;
    let rate = monthly_rate(terms.annual_rate_percent)?;
    let base = round_money(
        terms
            .principal
            .checked_div(Decimal::from(terms.months))
            .ok_or(ScheduleError::Overflow)?,
    );

    build_rows(terms, rate, |_| base)
}

/// Sum of the `total` column
pub fn total_paid(rows: &[PaymentRow]) -> Decimal {
    rows.iter().map(|row| row.total).sum()
}

/// Round to cents, halves away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn validate(terms: &LoanTerms) -> Result<(), ScheduleError> {
    if terms.principal <= Decimal::ZERO {
        return Err(ScheduleError::NonPositivePrincipal);
    }
    if terms.annual_rate_percent < Decimal::ZERO {
        return Err(ScheduleError::NegativeRate);
    }
    if terms.months == 0 {
        return Err(ScheduleError::EmptyTerm);
    }
    Ok(())
}

fn monthly_rate(annual_rate_percent: Decimal) -> Result<Decimal, ScheduleError> {
    annual_rate_percent
        .checked_div(Decimal::from(1200))
        .ok_or(ScheduleError::Overflow)
}

/// `P·r·(1+r)^n / ((1+r)^n − 1)`, or `P/n` without interest
fn level_payment(principal: Decimal, rate: Decimal, months: u32) -> Result<Decimal, ScheduleError> {
    if rate.is_zero() {
        let payment = principal
            .checked_div(Decimal::from(months))
            .ok_or(ScheduleError::Overflow)?;
        return Ok(round_money(payment));
    }

    let growth = (Decimal::ONE + rate)
        .checked_powu(u64::from(months))
        .ok_or(ScheduleError::Overflow)?;
    let numerator = principal
        .checked_mul(rate)
        .and_then(|v| v.checked_mul(growth))
        .ok_or(ScheduleError::Overflow)?;
    let payment = numerator
        .checked_div(growth - Decimal::ONE)
        .ok_or(ScheduleError::Overflow)?;

    Ok(round_money(payment))
}

/// Shared row loop. `principal_for` maps this month's interest to the
/// nominal principal part before capping.
fn build_rows(
    terms: &LoanTerms,
    rate: Decimal,
    principal_for: impl Fn(Decimal) -> Decimal,
) -> Result<Vec<PaymentRow>, ScheduleError> {
    let billing_day = match terms.billing_day {
        Some(day) if day > 0 => day,
        _ => terms.start.day(),
    };

    let mut rows = Vec::with_capacity(terms.months as usize);
    let mut remaining = terms.principal;

    for index in 0..terms.months {
        if remaining <= Decimal::ZERO {
            break;
        }

        let interest = round_money(remaining.checked_mul(rate).ok_or(ScheduleError::Overflow)?);
        let principal_part = if index + 1 == terms.months {
            remaining
        } else {
            principal_for(interest).max(Decimal::ZERO).min(remaining)
        };
        remaining -= principal_part;

        rows.push(PaymentRow {
            due_date: due_date(terms.start, index + 1, billing_day)?,
            principal_part,
            interest_part: interest,
            total: principal_part + interest,
            remaining_balance: remaining,
        });
    }

    Ok(rows)
}

/// `start`'s month plus `offset` months, on `billing_day` clamped to the
/// month's last day
fn due_date(start: NaiveDate, offset: u32, billing_day: u32) -> Result<NaiveDate, ScheduleError> {
    let month_start = start
        .with_day(1)
        .and_then(|d| d.checked_add_months(Months::new(offset)))
        .ok_or(ScheduleError::Overflow)?;

    let last_day = month_start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map(|d| d.day())
        .ok_or(ScheduleError::Overflow)?;

    month_start
        .with_day(billing_day.min(last_day))
        .ok_or(ScheduleError::Overflow)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms(principal: &str, rate: &str, months: u32) -> LoanTerms {
        LoanTerms {
            principal: dec(principal),
            annual_rate_percent: dec(rate),
            months,
            start: date(2025, 1, 15),
            billing_day: None,
        }
    }

    fn principal_sum(rows: &[PaymentRow]) -> Decimal {
        rows.iter().map(|row| row.principal_part).sum()
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec("0.125")), dec("0.13"));
        assert_eq!(round_money(dec("0.135")), dec("0.14"));
        assert_eq!(round_money(dec("2.344")), dec("2.34"));
    }

    #[test]
    fn test_annuity_pinned_values() {
        let rows = annuity_schedule(&terms("1000", "12", 12)).unwrap();

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].total, dec("88.85"));
        assert_eq!(rows[0].interest_part, dec("10.00"));
        assert_eq!(rows[0].principal_part, dec("78.85"));
        assert_eq!(rows[0].remaining_balance, dec("921.15"));
        assert_eq!(rows[1].interest_part, dec("9.21"));
        assert_eq!(rows[11].remaining_balance, Decimal::ZERO);
    }

    #[test]
    fn test_principal_parts_sum_to_principal() {
        let cases = [
            ("1000", "12", 12),
            ("15000", "7.9", 48),
            ("999.99", "0.5", 7),
            ("250000", "19.99", 360),
            ("100", "3", 1),
        ];

        for (principal, rate, months) in cases {
            for kind in [ScheduleKind::Annuity, ScheduleKind::Differentiated] {
                let rows = schedule(kind, &terms(principal, rate, months)).unwrap();
                assert_eq!(rows.len(), months as usize, "{kind:?} {principal} {rate} {months}");
                assert_eq!(principal_sum(&rows), dec(principal), "{kind:?} {principal}");
                assert_eq!(rows.last().unwrap().remaining_balance, Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_zero_rate() {
        let rows = annuity_schedule(&terms("1200", "0", 12)).unwrap();
        assert!(rows.iter().all(|row| row.total == dec("100.00")));
        assert!(rows.iter().all(|row| row.interest_part.is_zero()));

        // Uneven split: the final row absorbs the cent
        let rows = annuity_schedule(&terms("1000", "0", 3)).unwrap();
        let totals: Vec<_> = rows.iter().map(|row| row.total).collect();
        assert_eq!(totals, vec![dec("333.33"), dec("333.33"), dec("333.34")]);
    }

    #[test]
    fn test_differentiated_rows() {
        let rows = differentiated_schedule(&terms("1200", "12", 12)).unwrap();

        assert!(rows[..11].iter().all(|row| row.principal_part == dec("100")));
        assert_eq!(rows[0].interest_part, dec("12.00"));
        assert_eq!(rows[0].total, dec("112.00"));
        assert_eq!(rows[1].interest_part, dec("11.00"));
        assert_eq!(rows[11].interest_part, dec("1.00"));

        let rows = differentiated_schedule(&terms("1000", "6", 3)).unwrap();
        assert_eq!(rows[0].principal_part, dec("333.33"));
        assert_eq!(rows[2].principal_part, dec("333.34"));
    }

    #[test]
    fn test_billing_day_clamps_to_month_end() {
        let mut t = terms("900", "0", 4);
        t.billing_day = Some(31);
        let dates: Vec<_> = annuity_schedule(&t).unwrap().iter().map(|r| r.due_date).collect();

        assert_eq!(
            dates,
            vec![date(2025, 2, 28), date(2025, 3, 31), date(2025, 4, 30), date(2025, 5, 31)]
        );

        let mut t = terms("100", "0", 1);
        t.start = date(2023, 12, 31);
        let rows = annuity_schedule(&t).unwrap();
        assert_eq!(rows[0].due_date, date(2024, 1, 31));

        t.start = date(2024, 1, 31);
        let rows = annuity_schedule(&t).unwrap();
        assert_eq!(rows[0].due_date, date(2024, 2, 29));
    }

    #[test]
    fn test_invalid_terms() {
        assert_eq!(
            annuity_schedule(&terms("0", "5", 12)),
            Err(ScheduleError::NonPositivePrincipal)
        );
        assert_eq!(
            annuity_schedule(&terms("100", "-1", 12)),
            Err(ScheduleError::NegativeRate)
        );
        assert_eq!(
            differentiated_schedule(&terms("100", "5", 0)),
            Err(ScheduleError::EmptyTerm)
        );
    }

    #[test]
    fn test_schedule_kind_parse() {
        assert_eq!(ScheduleKind::parse("diff"), Some(ScheduleKind::Differentiated));
        assert_eq!(ScheduleKind::parse("Annuity"), Some(ScheduleKind::Annuity));
        assert_eq!(ScheduleKind::parse("balloon"), None);
    }
}
