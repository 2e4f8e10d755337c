use super::clock::ReferenceCalendar;
use super::money::{Amount, Balance};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maturation window applied when a plan does not override it.
pub const DEFAULT_MATURATION_HOURS: i64 = 24;

/// Longest maturation window a plan may carry, one leap year.
pub const MAX_MATURATION_HOURS: i64 = 24 * 366;

/// Converts an hour count from config or an import row into a maturation window.
pub fn maturation_from_hours(hours: i64) -> Result<TimeDelta> {
    if !(0..=MAX_MATURATION_HOURS).contains(&hours) {
        return Err(EngineError::ValidationError(format!(
            "maturation window must be between 0 and {MAX_MATURATION_HOURS} hours, got {hours}"
        )));
    }
    TimeDelta::try_hours(hours).ok_or_else(|| {
        EngineError::ValidationError(format!("maturation window out of range: {hours} hours"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a subscription.
///
/// The only transitions are `Pending -> Active` and `Active -> Completed`,
/// reachable through [`Subscription::activate`] and [`Subscription::complete`].
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    fn permits(self, next: SubscriptionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active) | (Self::Active, Self::Completed)
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-subscription plan parameters.
///
/// The engine treats these as opaque inputs copied from the plan definition
/// at purchase time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTerms {
    /// Fraction of principal credited per eligible day.
    pub daily_rate: Decimal,
    /// Total-return cap.
    pub payout_cap: Option<Balance>,
    /// Total accrual duration, in credited days.
    pub accrual_days: Option<u32>,
    pub maturation_secs: i64,
    /// Whether activation appends an `activation` ledger entry.
    pub activation_entry: bool,
}

impl PlanTerms {
    pub fn new(
        daily_rate: Decimal,
        payout_cap: Option<Balance>,
        accrual_days: Option<u32>,
    ) -> Result<Self> {
        let terms = Self {
            daily_rate,
            payout_cap,
            accrual_days,
            maturation_secs: TimeDelta::hours(DEFAULT_MATURATION_HOURS).num_seconds(),
            activation_entry: true,
        };
        terms.validate()?;
        Ok(terms)
    }

    pub fn with_maturation(mut self, maturation: TimeDelta) -> Result<Self> {
        self.maturation_secs = maturation.num_seconds();
        self.validate()?;
        Ok(self)
    }

    pub fn with_activation_entry(mut self, enabled: bool) -> Self {
        self.activation_entry = enabled;
        self
    }

    pub fn maturation(&self) -> TimeDelta {
        TimeDelta::seconds(self.maturation_secs.clamp(0, MAX_MATURATION_HOURS * 3600))
    }

    pub fn validate(&self) -> Result<()> {
        if self.daily_rate <= Decimal::ZERO {
            return Err(EngineError::ValidationError(format!(
                "daily rate must be positive, got {}",
                self.daily_rate
            )));
        }
        if let Some(cap) = self.payout_cap
            && cap <= Balance::ZERO
        {
            return Err(EngineError::ValidationError(format!(
                "payout cap must be positive, got {cap}"
            )));
        }
        if self.accrual_days == Some(0) {
            return Err(EngineError::ValidationError(
                "accrual duration must be at least one day".to_string(),
            ));
        }
        if self.payout_cap.is_none() && self.accrual_days.is_none() {
            return Err(EngineError::ValidationError(
                "plan needs a payout cap or an accrual duration".to_string(),
            ));
        }
        if self.maturation_secs < 0 {
            return Err(EngineError::ValidationError(
                "maturation window cannot be negative".to_string(),
            ));
        }
        if self.maturation_secs > MAX_MATURATION_HOURS * 3600 {
            return Err(EngineError::ValidationError(format!(
                "maturation window cannot exceed {MAX_MATURATION_HOURS} hours"
            )));
        }
        Ok(())
    }
}

/// Result of applying one daily credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditReceipt {
    pub day: NaiveDate,
    pub amount: Decimal,
    pub total_credited: Balance,
    pub completed: bool,
}

/// A user's purchased earning plan ("pack").
///
/// Status and the accrual bookkeeping are private: they only move through
/// [`activate`](Self::activate), [`credit`](Self::credit) and
/// [`complete`](Self::complete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: String,
    pub principal: Amount,
    pub terms: PlanTerms,
    pub created_at: DateTime<Utc>,
    status: SubscriptionStatus,
    activated_at: Option<DateTime<Utc>>,
    last_credited_on: Option<NaiveDate>,
    total_credited: Balance,
    days_credited: u32,
    completed_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Creates a freshly purchased subscription in `pending` state.
    pub fn pending(
        id: SubscriptionId,
        user_id: UserId,
        plan_id: impl Into<String>,
        principal: Amount,
        terms: PlanTerms,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        terms.validate()?;
        Ok(Self {
            id,
            user_id,
            plan_id: plan_id.into(),
            principal,
            terms,
            created_at,
            status: SubscriptionStatus::Pending,
            activated_at: None,
            last_credited_on: None,
            total_credited: Balance::ZERO,
            days_credited: 0,
            completed_at: None,
        })
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at
    }

    pub fn last_credited_on(&self) -> Option<NaiveDate> {
        self.last_credited_on
    }

    pub fn total_credited(&self) -> Balance {
        self.total_credited
    }

    pub fn days_credited(&self) -> u32 {
        self.days_credited
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// `true` once `now - created_at` has reached the maturation window.
    /// The boundary itself counts as matured.
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) >= self.terms.maturation()
    }

    /// `pending -> active`.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Active)?;
        if !self.is_mature(now) {
            return Err(EngineError::ValidationError(format!(
                "subscription {} has not matured yet",
                self.id
            )));
        }
        self.status = SubscriptionStatus::Active;
        self.activated_at = Some(now);
        Ok(())
    }

    /// `active -> completed`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Completed)?;
        self.status = SubscriptionStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition(&self, next: SubscriptionStatus) -> Result<()> {
        if self.status.permits(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    pub fn activation_day(&self, calendar: &ReferenceCalendar) -> Option<NaiveDate> {
        self.activated_at.map(|at| calendar.day_of(at))
    }

    /// Whether a credit is owed for `today`.
    ///
    /// The first credit falls due the day after activation; afterwards one
    /// credit per calendar day past the cursor.
    pub fn is_due(&self, today: NaiveDate, calendar: &ReferenceCalendar) -> bool {
        if self.status != SubscriptionStatus::Active {
            return false;
        }
        match self.last_credited_on {
            Some(last) => last < today,
            None => self
                .activation_day(calendar)
                .is_some_and(|activated| activated < today),
        }
    }

    /// The amount owed for one eligible day, clamped to the cap headroom.
    pub fn daily_earning(&self) -> Decimal {
        let raw = self.principal.apply_rate(self.terms.daily_rate);
        match self.terms.payout_cap {
            Some(cap) => raw.min(self.total_credited.headroom_to(cap).value()),
            None => raw,
        }
    }

    /// Applies the credit for `day` and completes the subscription if the
    /// cap or the accrual duration has been reached.
    ///
    /// Fails with `StateConflictError` when the subscription is no longer
    /// active or `day` is not past the accrual cursor.
    pub fn credit(
        &mut self,
        day: NaiveDate,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CreditReceipt> {
        if self.status != SubscriptionStatus::Active {
            return Err(EngineError::StateConflictError(
                self.id,
                format!("cannot credit a {} subscription", self.status),
            ));
        }
        if let Some(last) = self.last_credited_on
            && last >= day
        {
            return Err(EngineError::StateConflictError(
                self.id,
                format!("already credited through {last}"),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(EngineError::ValidationError(format!(
                "credit amount must be positive, got {amount}"
            )));
        }

        let amount = match self.terms.payout_cap {
            Some(cap) => amount.min(self.total_credited.headroom_to(cap).value()),
            None => amount,
        };

        self.total_credited += Balance::new(amount);
        self.days_credited += 1;
        self.last_credited_on = Some(day);

        let completed = self.accrual_finished();
        if completed {
            self.complete(now)?;
        }

        Ok(CreditReceipt {
            day,
            amount,
            total_credited: self.total_credited,
            completed,
        })
    }

    fn accrual_finished(&self) -> bool {
        let cap_reached = self
            .terms
            .payout_cap
            .is_some_and(|cap| self.total_credited >= cap);
        let duration_elapsed = self
            .terms
            .accrual_days
            .is_some_and(|days| self.days_credited >= days);
        cap_reached || duration_elapsed
    }
}
