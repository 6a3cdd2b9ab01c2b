use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use super::AssistantService;
use crate::amortization::{self, LoanTerms, PaymentRow, ScheduleKind};
use crate::db::{Credit, NewCredit, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::websocket::EventKind;

const MAX_TERM_MONTHS: u32 = 600;

impl AssistantService {
    pub async fn add_credit(&self, credit: NewCredit) -> ServiceResult<Credit> {
        if credit.title.trim().is_empty() {
            return Err(ServiceError::invalid("Title must not be empty"));
        }
        if credit.principal <= Decimal::ZERO {
            return Err(ServiceError::invalid("Principal must be positive"));
        }
        if credit.annual_rate_percent < Decimal::ZERO {
            return Err(ServiceError::invalid("Rate must not be negative"));
        }
        if !(1..=MAX_TERM_MONTHS).contains(&credit.months) {
            return Err(ServiceError::invalid(format!(
                "Term must be between 1 and {} months",
                MAX_TERM_MONTHS
            )));
        }

        let stored = self
            .storage("create_credit", move |db| db.create_credit(&credit))
            .await?;
        info!(user_id = stored.user_id, credit_id = stored.id, "Credit added");

        self.notify(EventKind::CreditAdded, stored.user_id, &stored);
        Ok(stored)
    }

    pub async fn list_credits(&self, owner: UserId) -> ServiceResult<Vec<Credit>> {
        self.storage("list_credits", move |db| db.list_credits(owner))
            .await
    }

    pub async fn get_credit(&self, owner: UserId, id: i64) -> ServiceResult<Credit> {
        self.storage("get_credit", move |db| db.get_credit(id, owner))
            .await?
            .ok_or(ServiceError::NotFound {
                entity: "Credit",
                id,
            })
    }

    pub async fn delete_credit(&self, owner: UserId, id: i64) -> ServiceResult<()> {
        let deleted = self
            .storage("delete_credit", move |db| db.delete_credit(id, owner))
            .await?;
        if !deleted {
            return Err(ServiceError::NotFound {
                entity: "Credit",
                id,
            });
        }

        self.notify(EventKind::CreditDeleted, owner, json!({ "id": id }));
        Ok(())
    }

    /// Store a new credit with the same terms as an existing one
    pub async fn copy_credit(&self, owner: UserId, id: i64) -> ServiceResult<Credit> {
        let source = self.get_credit(owner, id).await?;
        self.add_credit(NewCredit {
            user_id: owner,
            title: format!("{} (copy)", source.title),
            principal: source.principal,
            annual_rate_percent: source.annual_rate_percent,
            months: source.months,
        })
        .await
    }

    /// Payment plan for a stored credit, starting from its creation date
    pub async fn payment_schedule(
        &self,
        owner: UserId,
        id: i64,
        kind: ScheduleKind,
        billing_day: Option<u32>,
    ) -> ServiceResult<Vec<PaymentRow>> {
        let credit = self.get_credit(owner, id).await?;
        Self::schedule_for(&credit, kind, billing_day)
    }

    /// Same plan for a credit the caller already loaded
    pub fn schedule_for(
        credit: &Credit,
        kind: ScheduleKind,
        billing_day: Option<u32>,
    ) -> ServiceResult<Vec<PaymentRow>> {
        let terms = LoanTerms {
            principal: credit.principal,
            annual_rate_percent: credit.annual_rate_percent,
            months: credit.months,
            start: credit.created_at.date_naive(),
            billing_day,
        };
        Ok(amortization::schedule(kind, &terms)?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use crate::amortization::ScheduleKind;
    use crate::db::NewCredit;
    use crate::error::ServiceError;
    use crate::service::test_support::service;

    fn new_credit(user_id: i64) -> NewCredit {
        NewCredit {
            user_id,
            title: "Laptop".to_string(),
            principal: Decimal::from_str("2400").unwrap(),
            annual_rate_percent: Decimal::from_str("0").unwrap(),
            months: 12,
        }
    }

    #[tokio::test]
    async fn test_copy_and_schedule() {
        let service = service();
        let credit = service.add_credit(new_credit(1)).await.unwrap();

        let copy = service.copy_credit(1, credit.id).await.unwrap();
        assert_ne!(copy.id, credit.id);
        assert_eq!(copy.title, "Laptop (copy)");
        assert_eq!(copy.principal, credit.principal);

        let rows = service
            .payment_schedule(1, copy.id, ScheduleKind::Annuity, Some(10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 12);
        assert!(rows.iter().all(|row| row.total == Decimal::from(200)));
    }

    #[tokio::test]
    async fn test_other_users_credit_is_not_found() {
        let service = service();
        let credit = service.add_credit(new_credit(1)).await.unwrap();

        let err = service.get_credit(2, credit.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Credit", .. }));
        assert!(service.delete_credit(2, credit.id).await.is_err());
        service.delete_credit(1, credit.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_term_bounds() {
        let service = service();
        let mut credit = new_credit(1);
        credit.months = 601;
        assert!(service.add_credit(credit).await.is_err());
    }
}
