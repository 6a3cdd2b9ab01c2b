use rust_decimal::Decimal;
use tracing::info;

use super::AssistantService;
use crate::db::{FinanceEntry, FinanceStats, NewFinanceEntry, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::websocket::EventKind;

impl AssistantService {
    pub async fn add_finance_entry(&self, entry: NewFinanceEntry) -> ServiceResult<FinanceEntry> {
        if entry.amount <= Decimal::ZERO {
            return Err(ServiceError::invalid("Amount must be positive"));
        }
        if entry.category.trim().is_empty() {
            return Err(ServiceError::invalid("Category must not be empty"));
        }

        let stored = self
            .storage("create_finance_entry", move |db| db.create_finance_entry(&entry))
            .await?;
        info!(
            user_id = stored.user_id,
            entry_id = stored.id,
            kind = stored.kind.as_str(),
            "Finance entry added"
        );

        self.notify(EventKind::FinanceAdded, stored.user_id, &stored);
        Ok(stored)
    }

    pub async fn list_finance_entries(&self, owner: UserId) -> ServiceResult<Vec<FinanceEntry>> {
        self.storage("list_finance_entries", move |db| db.list_finance_entries(owner))
            .await
    }

    /// Income, expense, and balance over all of a user's entries
    pub async fn finance_stats(&self, owner: UserId) -> ServiceResult<FinanceStats> {
        let entries = self.list_finance_entries(owner).await?;
        Ok(FinanceStats::from_entries(&entries))
    }
}
