//! Periodic recurring-payment sweep.
//!
//! Each tick charges every payment whose due date has arrived, across all
//! users: an expense entry is written, the due date moves forward by one
//! period from its previous value, and a reminder task is created. A
//! payment several periods overdue catches up one period per tick.
//!
//! Charging is at-least-once. A storage call that times out keeps running
//! on the blocking pool and may still commit its expense entry, but the
//! payment counts as failed and its due date stays put, so the next tick
//! charges the same period again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::{EntryKind, NewFinanceEntry, RecurringPayment};
use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::service::AssistantService;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub failed: usize,
}

pub struct RecurringScheduler {
    service: Arc<AssistantService>,
    interval: Duration,
}

impl RecurringScheduler {
    pub fn new(service: Arc<AssistantService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Sweep immediately, then once per interval until `shutdown` fires.
    /// An in-flight sweep always finishes.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Recurring payment scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let today = Local::now().date_naive();
            match self.sweep(today).await {
                Ok(report) if report.processed > 0 || report.failed > 0 => {
                    info!(
                        processed = report.processed,
                        failed = report.failed,
                        "Recurring payment sweep finished"
                    );
                }
                Ok(_) => debug!("No recurring payments due"),
                Err(e) => {
                    error!(error = %format_error_chain(&e), "Failed to load recurring payments")
                }
            }
        }

        info!("Recurring payment scheduler stopped");
    }

    /// Process every payment due on or before `today`
    pub async fn sweep(&self, today: NaiveDate) -> ServiceResult<SweepReport> {
        let due = self.service.due_recurring(today).await?;
        let mut report = SweepReport::default();

        for payment in due {
            match self.process(&payment).await {
                Ok(next_due_date) => {
                    debug!(
                        payment_id = payment.id,
                        user_id = payment.user_id,
                        %next_due_date,
                        "Recurring payment processed"
                    );
                    report.processed += 1;
                    metrics::counter!("scheduler_payments_processed_total").increment(1);
                }
                Err(e) => {
                    error!(
                        payment_id = payment.id,
                        user_id = payment.user_id,
                        error = %format_error_chain(&e),
                        "Failed to process recurring payment"
                    );
                    report.failed += 1;
                    metrics::counter!("scheduler_payments_failed_total").increment(1);
                }
            }
        }

        Ok(report)
    }

    async fn process(&self, payment: &RecurringPayment) -> ServiceResult<NaiveDate> {
        self.service
            .add_finance_entry(NewFinanceEntry {
                user_id: payment.user_id,
                amount: payment.amount,
                category: payment.category.clone(),
                kind: EntryKind::Expense,
                note: format!("Recurring payment: {}", payment.title),
            })
            .await?;

        let next_due_date =
            payment
                .period
                .advance(payment.next_due_date)
                .ok_or_else(|| ServiceError::Internal {
                    message: format!("due date overflow for payment {}", payment.id),
                })?;

        self.service
            .record_recurring_execution(payment, next_due_date)
            .await?;

        // The charge is already recorded, so a missing reminder is not fatal
        if let Err(e) = self
            .service
            .add_reminder(
                payment.user_id,
                format!("Pay {}", payment.title),
                format!("{} {}", payment.amount, payment.category),
                payment.next_due_date,
            )
            .await
        {
            warn!(
                payment_id = payment.id,
                error = %format_error_chain(&e),
                "Failed to create payment reminder"
            );
        }

        Ok(next_due_date)
    }
}
