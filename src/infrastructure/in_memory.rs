use crate::domain::ports::LedgerStore;
use crate::domain::subscription::{CreditReceipt, Subscription, SubscriptionId, SubscriptionStatus};
use crate::domain::transaction::LedgerEntry;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    entries: Vec<LedgerEntry>,
    /// Secondary guard against double crediting, independent of the cursor.
    earning_days: HashSet<(SubscriptionId, NaiveDate)>,
}

impl LedgerState {
    fn subscription(&self, id: SubscriptionId) -> Result<&Subscription> {
        self.subscriptions
            .get(&id)
            .ok_or_else(|| EngineError::PersistenceError(format!("unknown subscription {id}")))
    }

    fn push_entry(&mut self, entry: LedgerEntry) -> Result<()> {
        if let Some((id, day)) = entry.earning_key()
            && !self.earning_days.insert((id, day))
        {
            return Err(EngineError::StateConflictError(
                id,
                format!("daily earning for {day} already recorded"),
            ));
        }
        self.entries.push(entry);
        Ok(())
    }
}

/// A thread-safe in-memory ledger.
///
/// Subscriptions, entries and the earning-day index sit behind one
/// `tokio::sync::RwLock`, so each write-lock scope is one atomic unit.
/// Ideal for tests and one-shot CLI runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_subscription(&self, subscription: Subscription) -> Result<()> {
        let mut state = self.state.write().await;
        if state.subscriptions.contains_key(&subscription.id) {
            return Err(EngineError::ValidationError(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        state.subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(state.subscriptions.get(&id).cloned())
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(state.subscriptions.values().cloned().collect())
    }

    async fn find_matured_pending(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.status() == SubscriptionStatus::Pending && s.is_mature(now))
            .cloned()
            .collect())
    }

    async fn find_active(&self) -> Result<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.status() == SubscriptionStatus::Active)
            .cloned()
            .collect())
    }

    async fn transition_pending_to_active(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let current = state.subscription(id)?;
        if current.status() != SubscriptionStatus::Pending || !current.is_mature(now) {
            return Ok(false);
        }

        let mut updated = current.clone();
        updated.activate(now)?;
        if updated.terms.activation_entry {
            state.push_entry(LedgerEntry::activation(&updated, now))?;
        }
        state.subscriptions.insert(id, updated);
        Ok(true)
    }

    async fn credit_daily_earning(
        &self,
        id: SubscriptionId,
        day: NaiveDate,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<CreditReceipt>> {
        let mut state = self.state.write().await;
        let mut updated = state.subscription(id)?.clone();
        let receipt = match updated.credit(day, amount, now) {
            Ok(receipt) => receipt,
            Err(EngineError::StateConflictError(..)) => return Ok(None),
            Err(e) => return Err(e),
        };

        // Entry first: if the index rejects it, the subscription is untouched.
        state.push_entry(LedgerEntry::daily_earning(&updated, day, receipt.amount, now))?;
        state.subscriptions.insert(id, updated);
        Ok(Some(receipt))
    }

    async fn append_entry(&self, entry: LedgerEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state.push_entry(entry)
    }

    async fn entries_for(&self, id: SubscriptionId) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.subscription_id == Some(id))
            .cloned()
            .collect())
    }
}
