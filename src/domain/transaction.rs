use super::subscription::{Subscription, SubscriptionId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Activation,
    DailyEarning,
}

/// An append-only ledger entry. Never mutated once written.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub subscription_id: Option<SubscriptionId>,
    pub kind: EntryKind,
    pub amount: Decimal,
    /// Calendar day a `daily_earning` entry pays out for.
    pub earning_day: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn activation(subscription: &Subscription, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            subscription_id: Some(subscription.id),
            kind: EntryKind::Activation,
            amount: subscription.principal.value(),
            earning_day: None,
            created_at,
        }
    }

    pub fn daily_earning(
        subscription: &Subscription,
        day: NaiveDate,
        amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            subscription_id: Some(subscription.id),
            kind: EntryKind::DailyEarning,
            amount,
            earning_day: Some(day),
            created_at,
        }
    }

    /// Uniqueness key for `daily_earning` entries: one per subscription per day.
    pub fn earning_key(&self) -> Option<(SubscriptionId, NaiveDate)> {
        match (self.kind, self.subscription_id, self.earning_day) {
            (EntryKind::DailyEarning, Some(id), Some(day)) => Some((id, day)),
            _ => None,
        }
    }
}
