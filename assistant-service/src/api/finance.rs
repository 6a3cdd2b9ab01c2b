//! Cash-flow and recurring payment endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::{AppState, AuthUser};
use crate::db::{
    EntryKind, FinanceEntry, FinanceStats, NewFinanceEntry, NewRecurringPayment, Period,
    RecurringPayment,
};
use crate::error::{ServiceError, ServiceResult};

/// Request body for POST /api/finance
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub amount: Decimal,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub note: String,
}

/// Request body for POST /api/finance/recurring
#[derive(Debug, Deserialize)]
pub struct CreateRecurringRequest {
    pub title: String,
    pub amount: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    pub period: Period,
    /// First charge date; one period from today when omitted
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
}

pub async fn list_entries_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ServiceResult<Json<Vec<FinanceEntry>>> {
    Ok(Json(state.service.list_finance_entries(owner).await?))
}

pub async fn create_entry_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateEntryRequest>,
) -> ServiceResult<(StatusCode, Json<FinanceEntry>)> {
    let entry = state
        .service
        .add_finance_entry(NewFinanceEntry {
            user_id: owner,
            amount: request.amount,
            category: request.category.trim().to_string(),
            kind: request.kind,
            note: request.note,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ServiceResult<Json<FinanceStats>> {
    Ok(Json(state.service.finance_stats(owner).await?))
}

pub async fn list_recurring_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ServiceResult<Json<Vec<RecurringPayment>>> {
    Ok(Json(state.service.list_recurring(owner).await?))
}

pub async fn create_recurring_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateRecurringRequest>,
) -> ServiceResult<(StatusCode, Json<RecurringPayment>)> {
    let next_due_date = match request.next_due_date {
        Some(date) => date,
        None => request
            .period
            .advance(Local::now().date_naive())
            .ok_or_else(|| ServiceError::invalid("Due date out of range"))?,
    };
    let category = request
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "recurring".to_string());

    let payment = state
        .service
        .add_recurring(NewRecurringPayment {
            user_id: owner,
            title: request.title.trim().to_string(),
            amount: request.amount,
            category,
            period: request.period,
            next_due_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn delete_recurring_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<i64>,
) -> ServiceResult<StatusCode> {
    state.service.delete_recurring(owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::api::test_support::state;

    #[tokio::test]
    async fn test_entries_and_stats() {
        let state = state();
        let request: CreateEntryRequest =
            serde_json::from_str(r#"{"amount": "120.50", "category": "food", "type": "expense"}"#)
                .unwrap();
        create_entry_handler(State(state.clone()), AuthUser(3), Json(request))
            .await
            .unwrap();
        let request: CreateEntryRequest =
            serde_json::from_str(r#"{"amount": 1000, "category": "salary", "type": "income"}"#)
                .unwrap();
        create_entry_handler(State(state.clone()), AuthUser(3), Json(request))
            .await
            .unwrap();

        let Json(stats) = stats_handler(State(state), AuthUser(3)).await.unwrap();
        assert_eq!(stats.balance, Decimal::from_str("879.50").unwrap());
        assert_eq!(stats.transactions, 2);
    }

    #[tokio::test]
    async fn test_recurring_defaults() {
        let state = state();
        let request: CreateRecurringRequest = serde_json::from_str(
            r#"{"title": "Gym", "amount": "30", "period": "weekly", "category": " "}"#,
        )
        .unwrap();

        let (status, Json(payment)) =
            create_recurring_handler(State(state.clone()), AuthUser(3), Json(request))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(payment.category, "recurring");
        assert!(payment.next_due_date > Local::now().date_naive());

        let status = delete_recurring_handler(State(state), AuthUser(3), Path(payment.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
