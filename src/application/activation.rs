use super::hooks::PostCommit;
use super::outcome::{ActivationSummary, SubscriptionFailure};
use crate::domain::clock::Clock;
use crate::domain::notification::{Notification, NotificationCategory};
use crate::domain::ports::{LedgerStoreRef, NotificationSinkRef};
use crate::domain::subscription::Subscription;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Promotes matured `pending` subscriptions to `active`.
///
/// Safe to run concurrently with itself: the store only flips rows that are
/// still pending, so an overlapping run sees a conflict instead of a second
/// activation.
pub struct ActivationProcessor {
    store: LedgerStoreRef,
    sink: NotificationSinkRef,
    clock: Arc<dyn Clock>,
}

impl ActivationProcessor {
    pub fn new(store: LedgerStoreRef, sink: NotificationSinkRef, clock: Arc<dyn Clock>) -> Self {
        Self { store, sink, clock }
    }

    /// Runs one activation pass.
    ///
    /// Fails only if the pending scan itself fails; per-subscription errors
    /// are collected in the summary.
    pub async fn activate_pending_subscriptions(&self) -> Result<ActivationSummary> {
        let now = self.clock.now();
        let candidates = self.store.find_matured_pending(now).await?;
        let mut summary = ActivationSummary {
            scanned: candidates.len(),
            ..Default::default()
        };

        for subscription in candidates {
            self.activate_one(&subscription, now, &mut summary).await;
        }

        info!(
            scanned = summary.scanned,
            activated = summary.activated,
            conflicts = summary.conflicts,
            failed = summary.failures.len(),
            "activation pass finished"
        );
        Ok(summary)
    }

    async fn activate_one(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
        summary: &mut ActivationSummary,
    ) {
        match self
            .store
            .transition_pending_to_active(subscription.id, now)
            .await
        {
            Ok(true) => {
                summary.activated += 1;
                info!(
                    subscription = %subscription.id,
                    user = %subscription.user_id,
                    "subscription activated"
                );

                let mut hooks = PostCommit::new();
                hooks.notify(Notification::new(
                    subscription.user_id,
                    NotificationCategory::PackActivated,
                    format!(
                        "Your {} pack #{} is now active and starts earning tomorrow.",
                        subscription.plan_id, subscription.id
                    ),
                ));
                summary.notification_failures += hooks.dispatch(self.sink.as_ref()).await;
            }
            Ok(false) | Err(EngineError::StateConflictError(..)) => {
                summary.conflicts += 1;
                debug!(subscription = %subscription.id, "already activated elsewhere");
            }
            Err(e) => {
                error!(subscription = %subscription.id, error = %e, "activation failed");
                summary.failures.push(SubscriptionFailure::new(subscription, &e));
            }
        }
    }
}
