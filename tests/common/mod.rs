#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use packledger::domain::money::{Amount, Balance};
use packledger::domain::ports::LedgerStore;
use packledger::domain::subscription::{
    CreditReceipt, PlanTerms, Subscription, SubscriptionId, UserId,
};
use packledger::domain::transaction::LedgerEntry;
use packledger::error::{EngineError, Result};
use packledger::infrastructure::in_memory::InMemoryLedgerStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

pub const SUBSCRIPTIONS_HEADER: &str = "id,user_id,plan_id,principal,daily_rate,payout_cap,accrual_days,maturation_hours,activation_entry,created_at";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
}

/// 1% daily on 100, capped at 10.
pub fn capped_terms() -> PlanTerms {
    PlanTerms::new(dec!(0.01), Some(Balance::new(dec!(10))), None).unwrap()
}

pub fn pending(id: u64, created_at: DateTime<Utc>) -> Subscription {
    Subscription::pending(
        SubscriptionId(id),
        UserId(id + 100),
        "gold",
        Amount::new(dec!(100)).unwrap(),
        capped_terms(),
        created_at,
    )
    .unwrap()
}

pub async fn seed(store: &dyn LedgerStore, ids: impl IntoIterator<Item = u64>, created_at: DateTime<Utc>) {
    for id in ids {
        store.insert_subscription(pending(id, created_at)).await.unwrap();
    }
}

pub fn subscriptions_csv(rows: &[&str]) -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "{SUBSCRIPTIONS_HEADER}").unwrap();
    for row in rows {
        writeln!(csv, "{row}").unwrap();
    }
    csv
}

/// In-memory store that fails on demand, per subscription or per scan.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryLedgerStore,
    pub failing_credits: HashSet<SubscriptionId>,
    pub failing_activations: HashSet<SubscriptionId>,
    pub fail_pending_scan: AtomicBool,
    pub fail_active_scan: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_credit_for(mut self, id: u64) -> Self {
        self.failing_credits.insert(SubscriptionId(id));
        self
    }

    pub fn failing_activation_for(mut self, id: u64) -> Self {
        self.failing_activations.insert(SubscriptionId(id));
        self
    }

    pub fn fail_scans(&self) {
        self.fail_pending_scan.store(true, Ordering::SeqCst);
        self.fail_active_scan.store(true, Ordering::SeqCst);
    }
}

fn unavailable(what: &str) -> EngineError {
    EngineError::PersistenceError(format!("{what}: storage unavailable"))
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn insert_subscription(&self, subscription: Subscription) -> Result<()> {
        self.inner.insert_subscription(subscription).await
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.inner.get_subscription(id).await
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.inner.all_subscriptions().await
    }

    async fn find_matured_pending(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        if self.fail_pending_scan.load(Ordering::SeqCst) {
            return Err(unavailable("pending scan"));
        }
        self.inner.find_matured_pending(now).await
    }

    async fn find_active(&self) -> Result<Vec<Subscription>> {
        if self.fail_active_scan.load(Ordering::SeqCst) {
            return Err(unavailable("active scan"));
        }
        self.inner.find_active().await
    }

    async fn transition_pending_to_active(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if self.failing_activations.contains(&id) {
            return Err(unavailable("activation"));
        }
        self.inner.transition_pending_to_active(id, now).await
    }

    async fn credit_daily_earning(
        &self,
        id: SubscriptionId,
        day: NaiveDate,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<CreditReceipt>> {
        if self.failing_credits.contains(&id) {
            return Err(unavailable("credit"));
        }
        self.inner.credit_daily_earning(id, day, amount, now).await
    }

    async fn append_entry(&self, entry: LedgerEntry) -> Result<()> {
        self.inner.append_entry(entry).await
    }

    async fn entries_for(&self, id: SubscriptionId) -> Result<Vec<LedgerEntry>> {
        self.inner.entries_for(id).await
    }
}
