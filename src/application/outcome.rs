use crate::domain::subscription::{Subscription, SubscriptionId, UserId};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which part of a cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleAction {
    ActivatePending,
    ProcessEarnings,
    #[default]
    FullCycle,
}

impl CycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivatePending => "activate_pending",
            Self::ProcessEarnings => "process_earnings",
            Self::FullCycle => "full_cycle",
        }
    }

    pub fn runs_activation(&self) -> bool {
        matches!(self, Self::ActivatePending | Self::FullCycle)
    }

    pub fn runs_accrual(&self) -> bool {
        matches!(self, Self::ProcessEarnings | Self::FullCycle)
    }
}

impl fmt::Display for CycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activate_pending" => Ok(Self::ActivatePending),
            "process_earnings" => Ok(Self::ProcessEarnings),
            "full_cycle" => Ok(Self::FullCycle),
            other => Err(EngineError::ValidationError(format!(
                "unknown action '{other}', expected activate_pending, process_earnings or full_cycle"
            ))),
        }
    }
}

/// One subscription that could not be processed in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionFailure {
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub error: String,
}

impl SubscriptionFailure {
    pub fn new(subscription: &Subscription, error: &EngineError) -> Self {
        Self {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationSummary {
    pub scanned: usize,
    pub activated: usize,
    /// Already claimed by a concurrent run.
    pub conflicts: usize,
    pub notification_failures: usize,
    pub failures: Vec<SubscriptionFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccrualSummary {
    pub scanned: usize,
    pub credited: usize,
    pub completed: usize,
    pub not_due: usize,
    /// Already credited for the day by a concurrent run.
    pub conflicts: usize,
    pub amount_credited: Decimal,
    pub notification_failures: usize,
    pub failures: Vec<SubscriptionFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Activation,
    Accrual,
}

/// A stage that could not run at all (e.g. its scan failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub action: CycleAction,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub activation: Option<ActivationSummary>,
    pub accrual: Option<AccrualSummary>,
    pub errors: Vec<StageError>,
}

impl CycleOutcome {
    pub fn new(action: CycleAction, started_at: DateTime<Utc>) -> Self {
        Self {
            action,
            started_at,
            finished_at: started_at,
            activation: None,
            accrual: None,
            errors: Vec::new(),
        }
    }

    /// No stage errors and no per-subscription failures.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.activation.as_ref().is_none_or(|a| a.failures.is_empty())
            && self.accrual.as_ref().is_none_or(|a| a.failures.is_empty())
    }
}
