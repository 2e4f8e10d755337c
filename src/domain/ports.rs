use super::notification::Notification;
use super::subscription::{CreditReceipt, Subscription, SubscriptionId};
use super::transaction::LedgerEntry;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Durable record of subscriptions and ledger entries.
///
/// Every mutating method is one atomic unit scoped to a single subscription:
/// it either applies completely or not at all. Conditional methods return
/// `false`/`None` when the row is no longer in the expected prior state.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>>;
    async fn all_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Pending subscriptions whose own maturation window has elapsed at `now`.
    async fn find_matured_pending(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>>;
    async fn find_active(&self) -> Result<Vec<Subscription>>;

    /// Activates `id` if it is still pending and matured at `now`, appending
    /// the activation entry when the plan asks for one.
    async fn transition_pending_to_active(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Credits `amount` for `day`. Returns `None` if the subscription was
    /// already credited for `day` or is no longer active.
    async fn credit_daily_earning(
        &self,
        id: SubscriptionId,
        day: NaiveDate,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<CreditReceipt>>;

    async fn append_entry(&self, entry: LedgerEntry) -> Result<()>;
    async fn entries_for(&self, id: SubscriptionId) -> Result<Vec<LedgerEntry>>;
}

/// Fire-and-forget delivery of user notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
