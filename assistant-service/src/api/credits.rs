//! Credit endpoints and payment plans.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amortization::{self, PaymentRow, ScheduleKind};
use crate::api::{AppState, AuthUser};
use crate::db::{Credit, NewCredit};
use crate::error::ServiceResult;

/// Request body for POST /api/credits
#[derive(Debug, Deserialize)]
pub struct CreateCreditRequest {
    pub title: String,
    pub principal: Decimal,
    #[serde(alias = "rate")]
    pub annual_rate_percent: Decimal,
    pub months: u32,
}

/// Query for GET /api/credits/{id}/schedule
#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    #[serde(default)]
    pub kind: ScheduleKind,
    pub billing_day: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub credit_id: i64,
    pub kind: ScheduleKind,
    pub total_paid: Decimal,
    pub rows: Vec<PaymentRow>,
}

pub async fn list_credits_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ServiceResult<Json<Vec<Credit>>> {
    Ok(Json(state.service.list_credits(owner).await?))
}

pub async fn create_credit_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateCreditRequest>,
) -> ServiceResult<(StatusCode, Json<Credit>)> {
    let credit = state
        .service
        .add_credit(NewCredit {
            user_id: owner,
            title: request.title.trim().to_string(),
            principal: request.principal,
            annual_rate_percent: request.annual_rate_percent,
            months: request.months,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(credit)))
}

/// DELETE /api/credits/{id} - close a credit
pub async fn delete_credit_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<i64>,
) -> ServiceResult<StatusCode> {
    state.service.delete_credit(owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn copy_credit_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<i64>,
) -> ServiceResult<(StatusCode, Json<Credit>)> {
    let copy = state.service.copy_credit(owner, id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<ScheduleQuery>,
) -> ServiceResult<Json<ScheduleResponse>> {
    let rows = state
        .service
        .payment_schedule(owner, id, query.kind, query.billing_day)
        .await?;

    Ok(Json(ScheduleResponse {
        credit_id: id,
        kind: query.kind,
        total_paid: amortization::total_paid(&rows),
        rows,
    }))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use axum::response::IntoResponse;

    use super::*;
    use crate::api::test_support::state;

    fn request(principal: &str, months: u32) -> CreateCreditRequest {
        CreateCreditRequest {
            title: "Laptop".to_string(),
            principal: Decimal::from_str(principal).unwrap(),
            annual_rate_percent: Decimal::from(12),
            months,
        }
    }

    #[tokio::test]
    async fn test_schedule_for_stored_credit() {
        let state = state();
        let (_, Json(credit)) =
            create_credit_handler(State(state.clone()), AuthUser(9), Json(request("1000", 12)))
                .await
                .unwrap();

        let Json(schedule) = schedule_handler(
            State(state.clone()),
            AuthUser(9),
            Path(credit.id),
            Query(ScheduleQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(schedule.kind, ScheduleKind::Annuity);
        assert_eq!(schedule.rows.len(), 12);
        let principal: Decimal = schedule.rows.iter().map(|r| r.principal_part).sum();
        assert_eq!(principal, Decimal::from(1000));

        // Someone else's credit is invisible
        let err = schedule_handler(
            State(state),
            AuthUser(10),
            Path(credit.id),
            Query(ScheduleQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_copy_and_close() {
        let state = state();
        let (_, Json(credit)) =
            create_credit_handler(State(state.clone()), AuthUser(9), Json(request("500", 6)))
                .await
                .unwrap();

        let (status, Json(copy)) =
            copy_credit_handler(State(state.clone()), AuthUser(9), Path(credit.id))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(copy.title, "Laptop (copy)");
        assert_ne!(copy.id, credit.id);

        delete_credit_handler(State(state.clone()), AuthUser(9), Path(credit.id))
            .await
            .unwrap();
        let Json(left) = list_credits_handler(State(state), AuthUser(9)).await.unwrap();
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_term_rejected() {
        let err = create_credit_handler(State(state()), AuthUser(9), Json(request("500", 0)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
