use crate::domain::ports::LedgerStore;
use crate::domain::subscription::{CreditReceipt, Subscription, SubscriptionId, SubscriptionStatus};
use crate::domain::transaction::LedgerEntry;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for subscription state, keyed by big-endian subscription id.
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
/// Column Family for ledger entries, keyed by subscription id, time and entry id.
pub const CF_ENTRIES: &str = "entries";
/// Column Family indexing `(subscription, day)` of every daily earning.
pub const CF_EARNING_DAYS: &str = "earning_days";

/// Key prefix for entries that belong to no subscription.
const NO_SUBSCRIPTION: u64 = u64::MAX;

/// A persistent ledger using RocksDB.
///
/// Every mutation is staged in a `WriteBatch` and committed in one write, so a
/// subscription's state change and its ledger entry land together or not at
/// all. The write mutex serializes read-check-write units; reads go straight
/// to the database.
///
/// `Clone` shares the underlying `Arc<DB>` and the write mutex.
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDbLedgerStore {
    /// Opens or creates a ledger at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_SUBSCRIPTIONS, CF_ENTRIES, CF_EARNING_DAYS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EngineError::PersistenceError(format!("{name} column family not found")))
    }

    fn load(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_existing(&self, id: SubscriptionId) -> Result<Subscription> {
        self.load(id)?
            .ok_or_else(|| EngineError::PersistenceError(format!("unknown subscription {id}")))
    }

    fn scan(&self, keep: impl Fn(&Subscription) -> bool) -> Result<Vec<Subscription>> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        let mut subscriptions = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let subscription: Subscription = serde_json::from_slice(&value)?;
            if keep(&subscription) {
                subscriptions.push(subscription);
            }
        }
        Ok(subscriptions)
    }

    fn stage_subscription(&self, batch: &mut WriteBatch, subscription: &Subscription) -> Result<()> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        batch.put_cf(cf, subscription.id.0.to_be_bytes(), serde_json::to_vec(subscription)?);
        Ok(())
    }

    fn stage_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        if let Some((id, day)) = entry.earning_key() {
            let days_cf = self.cf(CF_EARNING_DAYS)?;
            let key = earning_day_key(id, day);
            if self.db.get_pinned_cf(days_cf, &key)?.is_some() {
                return Err(EngineError::StateConflictError(
                    id,
                    format!("daily earning for {day} already recorded"),
                ));
            }
            batch.put_cf(days_cf, key, b"");
        }
        let entries_cf = self.cf(CF_ENTRIES)?;
        batch.put_cf(entries_cf, entry_key(entry), serde_json::to_vec(entry)?);
        Ok(())
    }
}

fn subscription_prefix(id: Option<SubscriptionId>) -> [u8; 8] {
    id.map_or(NO_SUBSCRIPTION, |id| id.0).to_be_bytes()
}

fn entry_key(entry: &LedgerEntry) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&subscription_prefix(entry.subscription_id));
    key.extend_from_slice(&entry.created_at.timestamp_micros().to_be_bytes());
    key.extend_from_slice(entry.id.as_bytes());
    key
}

fn earning_day_key(id: SubscriptionId, day: NaiveDate) -> Vec<u8> {
    let mut key = id.0.to_be_bytes().to_vec();
    key.extend_from_slice(day.format("%Y-%m-%d").to_string().as_bytes());
    key
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn insert_subscription(&self, subscription: Subscription) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        if self.load(subscription.id)?.is_some() {
            return Err(EngineError::ValidationError(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        let mut batch = WriteBatch::default();
        self.stage_subscription(&mut batch, &subscription)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.load(id)
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.scan(|_| true)
    }

    async fn find_matured_pending(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        self.scan(|s| s.status() == SubscriptionStatus::Pending && s.is_mature(now))
    }

    async fn find_active(&self) -> Result<Vec<Subscription>> {
        self.scan(|s| s.status() == SubscriptionStatus::Active)
    }

    async fn transition_pending_to_active(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        let mut subscription = self.load_existing(id)?;
        if subscription.status() != SubscriptionStatus::Pending || !subscription.is_mature(now) {
            return Ok(false);
        }
        subscription.activate(now)?;

        let mut batch = WriteBatch::default();
        if subscription.terms.activation_entry {
            self.stage_entry(&mut batch, &LedgerEntry::activation(&subscription, now))?;
        }
        self.stage_subscription(&mut batch, &subscription)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn credit_daily_earning(
        &self,
        id: SubscriptionId,
        day: NaiveDate,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<CreditReceipt>> {
        let _guard = self.write_guard.lock().await;
        let mut subscription = self.load_existing(id)?;
        let receipt = match subscription.credit(day, amount, now) {
            Ok(receipt) => receipt,
            Err(EngineError::StateConflictError(..)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut batch = WriteBatch::default();
        self.stage_entry(
            &mut batch,
            &LedgerEntry::daily_earning(&subscription, day, receipt.amount, now),
        )?;
        self.stage_subscription(&mut batch, &subscription)?;
        self.db.write(batch)?;
        Ok(Some(receipt))
    }

    async fn append_entry(&self, entry: LedgerEntry) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &entry)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn entries_for(&self, id: SubscriptionId) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf(CF_ENTRIES)?;
        let prefix = subscription_prefix(Some(id));
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}
