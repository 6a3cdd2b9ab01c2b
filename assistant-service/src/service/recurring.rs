use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use super::AssistantService;
use crate::db::{NewRecurringPayment, RecurringPayment, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::websocket::EventKind;

impl AssistantService {
    pub async fn add_recurring(
        &self,
        payment: NewRecurringPayment,
    ) -> ServiceResult<RecurringPayment> {
        if payment.title.trim().is_empty() {
            return Err(ServiceError::invalid("Title must not be empty"));
        }
        if payment.amount <= Decimal::ZERO {
            return Err(ServiceError::invalid("Amount must be positive"));
        }

        let stored = self
            .storage("create_recurring", move |db| db.create_recurring(&payment))
            .await?;
        info!(
            user_id = stored.user_id,
            payment_id = stored.id,
            period = stored.period.as_str(),
            next_due = %stored.next_due_date,
            "Recurring payment added"
        );

        self.notify(EventKind::RecurringAdded, stored.user_id, &stored);
        Ok(stored)
    }

    pub async fn list_recurring(&self, owner: UserId) -> ServiceResult<Vec<RecurringPayment>> {
        self.storage("list_recurring", move |db| db.list_recurring(owner))
            .await
    }

    /// Payments of every user whose due date is on or before `today`
    pub async fn due_recurring(&self, today: NaiveDate) -> ServiceResult<Vec<RecurringPayment>> {
        let all = self
            .storage("list_all_recurring", |db| db.list_all_recurring())
            .await?;
        Ok(all
            .into_iter()
            .filter(|payment| payment.next_due_date <= today)
            .collect())
    }

    pub async fn delete_recurring(&self, owner: UserId, id: i64) -> ServiceResult<()> {
        let not_found = || ServiceError::NotFound {
            entity: "Recurring payment",
            id,
        };
        let payment = self
            .storage("get_recurring", move |db| db.get_recurring(id, owner))
            .await?
            .ok_or_else(not_found)?;
        let deleted = self
            .storage("delete_recurring", move |db| db.delete_recurring(id, owner))
            .await?;
        if !deleted {
            return Err(not_found());
        }

        self.notify(
            EventKind::RecurringDeleted,
            owner,
            json!({ "id": id, "title": payment.title }),
        );
        Ok(())
    }

    /// Persist a payment's advanced due date after it has been charged
    pub async fn record_recurring_execution(
        &self,
        payment: &RecurringPayment,
        next_due_date: NaiveDate,
    ) -> ServiceResult<()> {
        if next_due_date <= payment.next_due_date {
            return Err(ServiceError::Internal {
                message: format!(
                    "due date for payment {} must move forward ({} -> {})",
                    payment.id, payment.next_due_date, next_due_date
                ),
            });
        }

        let id = payment.id;
        self.storage("update_next_due_date", move |db| {
            db.update_next_due_date(id, next_due_date)
        })
        .await?;

        self.notify(
            EventKind::RecurringProcessed,
            payment.user_id,
            json!({
                "id": payment.id,
                "title": payment.title,
                "amount": payment.amount,
                "charged_for": payment.next_due_date,
                "next_due_date": next_due_date,
            }),
        );
        Ok(())
    }
}
