use crate::domain::money::{Amount, Balance};
use crate::domain::subscription::{
    PlanTerms, Subscription, SubscriptionId, UserId, maturation_from_hours,
};
use crate::error::{EngineError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One purchase record as exported by the payment flow.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SubscriptionRecord {
    pub id: u64,
    pub user_id: u64,
    pub plan_id: String,
    pub principal: Decimal,
    pub daily_rate: Decimal,
    pub payout_cap: Option<Decimal>,
    pub accrual_days: Option<u32>,
    pub maturation_hours: Option<i64>,
    pub activation_entry: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Builds a `pending` subscription, filling blank columns with defaults.
    pub fn into_subscription(self, default_maturation: TimeDelta) -> Result<Subscription> {
        let maturation = match self.maturation_hours {
            Some(hours) => maturation_from_hours(hours)
                .map_err(|e| EngineError::ValidationError(format!("subscription {}: {e}", self.id)))?,
            None => default_maturation,
        };
        let terms = PlanTerms::new(
            self.daily_rate,
            self.payout_cap.map(Balance::new),
            self.accrual_days,
        )?
        .with_maturation(maturation)?
        .with_activation_entry(self.activation_entry.unwrap_or(true));

        Subscription::pending(
            SubscriptionId(self.id),
            UserId(self.user_id),
            self.plan_id,
            Amount::new(self.principal)?,
            terms,
            self.created_at,
        )
        .map_err(|e| EngineError::ValidationError(format!("subscription {}: {e}", self.id)))
    }
}

/// Reads purchase records from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// and yields records lazily.
pub struct SubscriptionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SubscriptionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn records(self) -> impl Iterator<Item = Result<SubscriptionRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EngineError::from))
    }

    /// Reads and converts every row; a bad row yields an error item and
    /// reading continues with the next one.
    pub fn subscriptions(
        self,
        default_maturation: TimeDelta,
    ) -> impl Iterator<Item = Result<Subscription>> {
        self.records()
            .map(move |record| record.and_then(|r| r.into_subscription(default_maturation)))
    }
}
