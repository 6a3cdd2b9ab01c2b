//! Dialogue drafts and step transitions.
//!
//! A draft's current step is its first unset field. Feeding text to
//! [`Dialogue::step`] either rejects it (the draft is unchanged), fills
//! that field, or, once every field is set, yields the record to persist.

use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;

use crate::db::{
    EntryKind, NewCredit, NewFinanceEntry, NewRecurringPayment, NewTodo, Period, UserId,
};

/// Marker users send to skip an optional field
const SKIP: &str = "-";

const DEFAULT_RECURRING_CATEGORY: &str = "recurring";
const MAX_CREDIT_MONTHS: u32 = 600;
const MAX_BILLING_DAY: u32 = 28;

/// Which dialogue is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueKind {
    TodoAdd,
    FinanceAdd,
    RecurringAdd,
    CreditAdd,
}

impl DialogueKind {
    pub fn tag(&self) -> &'static str {
        match self {
            DialogueKind::TodoAdd => "TODO_ADD",
            DialogueKind::FinanceAdd => "FIN_ADD",
            DialogueKind::RecurringAdd => "RECURRING_ADD",
            DialogueKind::CreditAdd => "CREDIT_ADD",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoDraft {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinanceDraft {
    pub kind: Option<EntryKind>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecurringDraft {
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub period: Option<Period>,
    /// Only asked for monthly payments
    pub billing_day: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreditDraft {
    pub title: Option<String>,
    pub principal: Option<Decimal>,
    pub annual_rate_percent: Option<Decimal>,
    pub months: Option<u32>,
}

/// In-progress dialogue with its partially filled draft
#[derive(Debug, Clone, PartialEq)]
pub enum Dialogue {
    TodoAdd(TodoDraft),
    FinanceAdd(FinanceDraft),
    RecurringAdd(RecurringDraft),
    CreditAdd(CreditDraft),
}

/// Question asked for the field a dialogue is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    TodoTitle,
    FinanceKind,
    FinanceAmount,
    FinanceCategory,
    FinanceNote,
    RecurringTitle,
    RecurringAmount,
    RecurringCategory,
    RecurringPeriod,
    RecurringBillingDay,
    CreditTitle,
    CreditPrincipal,
    CreditRate,
    CreditMonths,
}

impl Prompt {
    /// Message catalogue key for the question
    pub fn message_key(&self) -> &'static str {
        match self {
            Prompt::TodoTitle => "prompt-todo-title",
            Prompt::FinanceKind => "prompt-finance-kind",
            Prompt::FinanceAmount => "prompt-finance-amount",
            Prompt::FinanceCategory => "prompt-finance-category",
            Prompt::FinanceNote => "prompt-finance-note",
            Prompt::RecurringTitle => "prompt-recurring-title",
            Prompt::RecurringAmount => "prompt-recurring-amount",
            Prompt::RecurringCategory => "prompt-recurring-category",
            Prompt::RecurringPeriod => "prompt-recurring-period",
            Prompt::RecurringBillingDay => "prompt-recurring-billing-day",
            Prompt::CreditTitle => "prompt-credit-title",
            Prompt::CreditPrincipal => "prompt-credit-principal",
            Prompt::CreditRate => "prompt-credit-rate",
            Prompt::CreditMonths => "prompt-credit-months",
        }
    }

    /// Catalogue key explaining why input for this field was rejected
    pub fn invalid_key(&self) -> &'static str {
        match self {
            Prompt::TodoTitle
            | Prompt::FinanceCategory
            | Prompt::RecurringTitle
            | Prompt::CreditTitle => "invalid-text",
            Prompt::FinanceKind => "invalid-entry-kind",
            Prompt::FinanceAmount | Prompt::RecurringAmount | Prompt::CreditPrincipal => {
                "invalid-amount"
            }
            Prompt::CreditRate => "invalid-rate",
            Prompt::CreditMonths => "invalid-months",
            Prompt::RecurringPeriod => "invalid-period",
            Prompt::RecurringBillingDay => "invalid-billing-day",
            // Free-text fields with a skip marker accept anything non-empty
            Prompt::FinanceNote | Prompt::RecurringCategory => "invalid-text",
        }
    }
}

/// Record produced by a finished dialogue
#[derive(Debug, Clone)]
pub enum Completed {
    Todo(NewTodo),
    Finance(NewFinanceEntry),
    Recurring(NewRecurringPayment),
    Credit(NewCredit),
}

/// Outcome of feeding one message to a dialogue
#[derive(Debug, Clone)]
pub enum Step {
    /// Input rejected; ask the same question again
    Invalid(Prompt),
    /// Field accepted; store the new draft and ask the next question
    Continue(Dialogue),
    /// Every field collected
    Complete(Completed),
}

impl Dialogue {
    pub fn empty(kind: DialogueKind) -> Self {
        match kind {
            DialogueKind::TodoAdd => Dialogue::TodoAdd(TodoDraft::default()),
            DialogueKind::FinanceAdd => Dialogue::FinanceAdd(FinanceDraft::default()),
            DialogueKind::RecurringAdd => Dialogue::RecurringAdd(RecurringDraft::default()),
            DialogueKind::CreditAdd => Dialogue::CreditAdd(CreditDraft::default()),
        }
    }

    pub fn kind(&self) -> DialogueKind {
        match self {
            Dialogue::TodoAdd(_) => DialogueKind::TodoAdd,
            Dialogue::FinanceAdd(_) => DialogueKind::FinanceAdd,
            Dialogue::RecurringAdd(_) => DialogueKind::RecurringAdd,
            Dialogue::CreditAdd(_) => DialogueKind::CreditAdd,
        }
    }

    /// The question for the first field still unset
    pub fn prompt(&self) -> Prompt {
        match self {
            Dialogue::TodoAdd(_) => Prompt::TodoTitle,
            Dialogue::FinanceAdd(d) => {
                if d.kind.is_none() {
                    Prompt::FinanceKind
                } else if d.amount.is_none() {
                    Prompt::FinanceAmount
                } else if d.category.is_none() {
                    Prompt::FinanceCategory
                } else {
                    Prompt::FinanceNote
                }
            }
            Dialogue::RecurringAdd(d) => {
                if d.title.is_none() {
                    Prompt::RecurringTitle
                } else if d.amount.is_none() {
                    Prompt::RecurringAmount
                } else if d.category.is_none() {
                    Prompt::RecurringCategory
                } else if d.period.is_none() {
                    Prompt::RecurringPeriod
                } else {
                    Prompt::RecurringBillingDay
                }
            }
            Dialogue::CreditAdd(d) => {
                if d.title.is_none() {
                    Prompt::CreditTitle
                } else if d.principal.is_none() {
                    Prompt::CreditPrincipal
                } else if d.annual_rate_percent.is_none() {
                    Prompt::CreditRate
                } else {
                    Prompt::CreditMonths
                }
            }
        }
    }

    /// Apply one message from `owner` to the current step
    pub fn step(&self, owner: UserId, input: &str, today: NaiveDate) -> Step {
        let prompt = self.prompt();
        let input = input.trim();

        match self {
            Dialogue::TodoAdd(_) => match parse_text(input) {
                Some(title) => Step::Complete(Completed::Todo(NewTodo {
                    user_id: owner,
                    title,
                    description: String::new(),
                    due_date: None,
                })),
                None => Step::Invalid(prompt),
            },
            Dialogue::FinanceAdd(d) => step_finance(d.clone(), owner, prompt, input),
            Dialogue::RecurringAdd(d) => step_recurring(d.clone(), owner, prompt, input, today),
            Dialogue::CreditAdd(d) => step_credit(d.clone(), owner, prompt, input),
        }
    }
}

fn step_finance(mut d: FinanceDraft, owner: UserId, prompt: Prompt, input: &str) -> Step {
    let accepted = match prompt {
        Prompt::FinanceKind => EntryKind::parse(input).map(|v| d.kind = Some(v)),
        Prompt::FinanceAmount => parse_positive(input).map(|v| d.amount = Some(v)),
        Prompt::FinanceCategory => parse_text(input).map(|v| d.category = Some(v)),
        _ => parse_optional_text(input).map(|v| d.note = Some(v)),
    };
    if accepted.is_none() {
        return Step::Invalid(prompt);
    }

    match (d.kind, d.amount, d.category.clone(), d.note.clone()) {
        (Some(kind), Some(amount), Some(category), Some(note)) => {
            Step::Complete(Completed::Finance(NewFinanceEntry {
                user_id: owner,
                amount,
                category,
                kind,
                note,
            }))
        }
        _ => Step::Continue(Dialogue::FinanceAdd(d)),
    }
}

fn step_recurring(
    mut d: RecurringDraft,
    owner: UserId,
    prompt: Prompt,
    input: &str,
    today: NaiveDate,
) -> Step {
    let accepted = match prompt {
        Prompt::RecurringTitle => parse_text(input).map(|v| d.title = Some(v)),
        Prompt::RecurringAmount => parse_positive(input).map(|v| d.amount = Some(v)),
        Prompt::RecurringCategory => parse_optional_text(input).map(|v| {
            let category = if v.is_empty() {
                DEFAULT_RECURRING_CATEGORY.to_string()
            } else {
                v
            };
            d.category = Some(category);
        }),
        Prompt::RecurringPeriod => Period::parse(input).map(|v| d.period = Some(v)),
        _ => parse_bounded(input, 1, MAX_BILLING_DAY).map(|v| d.billing_day = Some(v)),
    };
    if accepted.is_none() {
        return Step::Invalid(prompt);
    }

    let (Some(title), Some(amount), Some(category), Some(period)) =
        (d.title.clone(), d.amount, d.category.clone(), d.period)
    else {
        return Step::Continue(Dialogue::RecurringAdd(d));
    };

    let next_due_date = match (period, d.billing_day) {
        (Period::Monthly, None) => return Step::Continue(Dialogue::RecurringAdd(d)),
        (Period::Monthly, Some(day)) => next_billing_date(today, day),
        (other, _) => other.advance(today),
    };

    match next_due_date {
        Some(next_due_date) => Step::Complete(Completed::Recurring(NewRecurringPayment {
            user_id: owner,
            title,
            amount,
            category,
            period,
            next_due_date,
        })),
        None => Step::Invalid(prompt),
    }
}

fn step_credit(mut d: CreditDraft, owner: UserId, prompt: Prompt, input: &str) -> Step {
    let accepted = match prompt {
        Prompt::CreditTitle => parse_text(input).map(|v| d.title = Some(v)),
        Prompt::CreditPrincipal => parse_positive(input).map(|v| d.principal = Some(v)),
        Prompt::CreditRate => parse_non_negative(input).map(|v| d.annual_rate_percent = Some(v)),
        _ => parse_bounded(input, 1, MAX_CREDIT_MONTHS).map(|v| d.months = Some(v)),
    };
    if accepted.is_none() {
        return Step::Invalid(prompt);
    }

    match (d.title.clone(), d.principal, d.annual_rate_percent, d.months) {
        (Some(title), Some(principal), Some(annual_rate_percent), Some(months)) => {
            Step::Complete(Completed::Credit(NewCredit {
                user_id: owner,
                title,
                principal,
                annual_rate_percent,
                months,
            }))
        }
        _ => Step::Continue(Dialogue::CreditAdd(d)),
    }
}

/// First occurrence of `day` strictly after `today`
fn next_billing_date(today: NaiveDate, day: u32) -> Option<NaiveDate> {
    let this_month = today.with_day(day)?;
    if this_month > today {
        Some(this_month)
    } else {
        this_month.checked_add_months(Months::new(1))
    }
}

fn parse_text(input: &str) -> Option<String> {
    (!input.is_empty()).then(|| input.to_string())
}

/// Non-empty text, with the skip marker meaning "none"
fn parse_optional_text(input: &str) -> Option<String> {
    match input {
        "" => None,
        SKIP => Some(String::new()),
        text => Some(text.to_string()),
    }
}

/// Decimal accepting either `.` or `,` as separator
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}

fn parse_positive(input: &str) -> Option<Decimal> {
    parse_decimal(input).filter(|v| *v > Decimal::ZERO)
}

fn parse_non_negative(input: &str) -> Option<Decimal> {
    parse_decimal(input).filter(|v| *v >= Decimal::ZERO)
}

fn parse_bounded(input: &str, min: u32, max: u32) -> Option<u32> {
    input
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
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

    /// Feed inputs in order, carrying each accepted draft forward
    fn run(kind: DialogueKind, inputs: &[&str], today: NaiveDate) -> Step {
        let mut dialogue = Dialogue::empty(kind);
        let mut last = None;
        for input in inputs {
            let step = dialogue.step(1, input, today);
            if let Step::Continue(next) = &step {
                dialogue = next.clone();
            }
            last = Some(step);
        }
        last.unwrap()
    }

    #[test]
    fn test_decimal_separators() {
        assert_eq!(parse_decimal("12,50"), Some(dec("12.50")));
        assert_eq!(parse_decimal(" 7.25 "), Some(dec("7.25")));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-3"), None);
        assert_eq!(parse_non_negative("0"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_todo_completes_on_title() {
        let step = run(DialogueKind::TodoAdd, &["Buy milk"], date(2025, 5, 1));
        match step {
            Step::Complete(Completed::Todo(todo)) => {
                assert_eq!(todo.title, "Buy milk");
                assert_eq!(todo.user_id, 1);
            }
            other => panic!("unexpected step: {other:?}"),
        }

        let step = Dialogue::empty(DialogueKind::TodoAdd).step(1, "   ", date(2025, 5, 1));
        assert!(matches!(step, Step::Invalid(Prompt::TodoTitle)));
    }

    #[test]
    fn test_finance_dialogue() {
        let step = run(
            DialogueKind::FinanceAdd,
            &["Expense", "12,5", "food", "-"],
            date(2025, 5, 1),
        );
        match step {
            Step::Complete(Completed::Finance(entry)) => {
                assert_eq!(entry.kind, EntryKind::Expense);
                assert_eq!(entry.amount, dec("12.5"));
                assert_eq!(entry.category, "food");
                assert_eq!(entry.note, "");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_input_keeps_step() {
        let dialogue = Dialogue::FinanceAdd(FinanceDraft {
            kind: Some(EntryKind::Income),
            ..Default::default()
        });

        for bad in ["zero", "0", "-5", ""] {
            match dialogue.step(1, bad, date(2025, 5, 1)) {
                Step::Invalid(prompt) => assert_eq!(prompt, Prompt::FinanceAmount),
                other => panic!("{bad:?} accepted: {other:?}"),
            }
        }
        assert_eq!(dialogue.prompt(), Prompt::FinanceAmount);
    }

    #[test]
    fn test_recurring_monthly_asks_billing_day() {
        let today = date(2025, 5, 20);

        let step = run(
            DialogueKind::RecurringAdd,
            &["Rent", "800", "-", "monthly"],
            today,
        );
        let Step::Continue(dialogue) = step else {
            panic!("expected billing day question");
        };
        assert_eq!(dialogue.prompt(), Prompt::RecurringBillingDay);

        assert!(matches!(
            dialogue.step(1, "31", today),
            Step::Invalid(Prompt::RecurringBillingDay)
        ));

        match dialogue.step(1, "5", today) {
            Step::Complete(Completed::Recurring(payment)) => {
                assert_eq!(payment.category, "recurring");
                assert_eq!(payment.period, Period::Monthly);
                assert_eq!(payment.next_due_date, date(2025, 6, 5));
            }
            other => panic!("unexpected step: {other:?}"),
        }

        match dialogue.step(1, "25", today) {
            Step::Complete(Completed::Recurring(payment)) => {
                assert_eq!(payment.next_due_date, date(2025, 5, 25));
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_recurring_weekly_skips_billing_day() {
        let step = run(
            DialogueKind::RecurringAdd,
            &["Cleaning", "30", "home", "weekly"],
            date(2025, 5, 20),
        );
        match step {
            Step::Complete(Completed::Recurring(payment)) => {
                assert_eq!(payment.next_due_date, date(2025, 5, 27));
                assert_eq!(payment.category, "home");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_credit_dialogue_bounds() {
        let today = date(2025, 5, 20);
        let step = run(DialogueKind::CreditAdd, &["Car", "15000", "0"], today);
        let Step::Continue(dialogue) = step else {
            panic!("expected months question");
        };

        assert!(matches!(dialogue.step(1, "0", today), Step::Invalid(Prompt::CreditMonths)));
        assert!(matches!(dialogue.step(1, "601", today), Step::Invalid(Prompt::CreditMonths)));
        match dialogue.step(1, "48", today) {
            Step::Complete(Completed::Credit(credit)) => {
                assert_eq!(credit.months, 48);
                assert_eq!(credit.annual_rate_percent, Decimal::ZERO);
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }
}
