use super::hooks::PostCommit;
use super::outcome::{AccrualSummary, SubscriptionFailure};
use crate::domain::clock::{Clock, ReferenceCalendar};
use crate::domain::notification::{Notification, NotificationCategory};
use crate::domain::ports::{LedgerStoreRef, NotificationSinkRef};
use crate::domain::subscription::{CreditReceipt, Subscription};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Default number of subscriptions credited concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

enum CreditOutcome {
    Credited {
        receipt: CreditReceipt,
        notification_failures: usize,
    },
    NotDue,
    Conflict,
    Failed(SubscriptionFailure),
}

/// Credits one day's earnings to every eligible `active` subscription.
///
/// Each subscription is an independent unit: the store re-checks the accrual
/// cursor under its own atomic scope, so overlapping runs on the same day
/// credit at most once.
pub struct AccrualProcessor {
    store: LedgerStoreRef,
    sink: NotificationSinkRef,
    clock: Arc<dyn Clock>,
    calendar: ReferenceCalendar,
    max_concurrency: usize,
}

impl AccrualProcessor {
    pub fn new(
        store: LedgerStoreRef,
        sink: NotificationSinkRef,
        clock: Arc<dyn Clock>,
        calendar: ReferenceCalendar,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            calendar,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Runs one accrual pass for the current reference day.
    pub async fn process_daily_credits(&self) -> Result<AccrualSummary> {
        let now = self.clock.now();
        let today = self.calendar.day_of(now);
        let active = self.store.find_active().await?;
        let mut summary = AccrualSummary {
            scanned: active.len(),
            ..Default::default()
        };

        let mut outcomes = stream::iter(active)
            .map(|subscription| self.credit_one(subscription, today, now))
            .buffer_unordered(self.max_concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                CreditOutcome::Credited {
                    receipt,
                    notification_failures,
                } => {
                    summary.credited += 1;
                    summary.amount_credited += receipt.amount;
                    summary.notification_failures += notification_failures;
                    if receipt.completed {
                        summary.completed += 1;
                    }
                }
                CreditOutcome::NotDue => summary.not_due += 1,
                CreditOutcome::Conflict => summary.conflicts += 1,
                CreditOutcome::Failed(failure) => summary.failures.push(failure),
            }
        }

        info!(
            %today,
            scanned = summary.scanned,
            credited = summary.credited,
            completed = summary.completed,
            amount = %summary.amount_credited,
            failed = summary.failures.len(),
            "accrual pass finished"
        );
        Ok(summary)
    }

    async fn credit_one(
        &self,
        subscription: Subscription,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> CreditOutcome {
        if !subscription.is_due(today, &self.calendar) {
            debug!(subscription = %subscription.id, %today, "not due");
            return CreditOutcome::NotDue;
        }

        let amount = subscription.daily_earning();
        let receipt = match self
            .store
            .credit_daily_earning(subscription.id, today, amount, now)
            .await
        {
            Ok(Some(receipt)) => receipt,
            Ok(None) | Err(EngineError::StateConflictError(..)) => {
                debug!(subscription = %subscription.id, %today, "already credited");
                return CreditOutcome::Conflict;
            }
            Err(e) => {
                error!(subscription = %subscription.id, error = %e, "credit failed");
                return CreditOutcome::Failed(SubscriptionFailure::new(&subscription, &e));
            }
        };

        info!(
            subscription = %subscription.id,
            user = %subscription.user_id,
            amount = %receipt.amount,
            day = %receipt.day,
            completed = receipt.completed,
            "daily earning credited"
        );

        let mut hooks = PostCommit::new();
        hooks.notify(Notification::new(
            subscription.user_id,
            NotificationCategory::EarningCredited,
            format!(
                "Pack #{} earned {} for {}.",
                subscription.id,
                receipt.amount.normalize(),
                receipt.day
            ),
        ));
        if receipt.completed {
            hooks.notify(Notification::new(
                subscription.user_id,
                NotificationCategory::PackCompleted,
                format!(
                    "Pack #{} has completed with {} credited in total.",
                    subscription.id, receipt.total_credited
                ),
            ));
        }
        let notification_failures = hooks.dispatch(self.sink.as_ref()).await;

        CreditOutcome::Credited {
            receipt,
            notification_failures,
        }
    }
}
