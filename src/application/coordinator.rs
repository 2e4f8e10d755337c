use super::accrual::{AccrualProcessor, DEFAULT_MAX_CONCURRENCY};
use super::activation::ActivationProcessor;
use super::outcome::{CycleAction, CycleOutcome, Stage, StageError};
use crate::domain::clock::{Clock, ReferenceCalendar};
use crate::domain::ports::{LedgerStoreRef, NotificationSinkRef};
use crate::error::{EngineError, Result};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

/// Engine-wide knobs that are not per-plan terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub calendar: ReferenceCalendar,
    pub max_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            calendar: ReferenceCalendar::utc(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Runs one batch cycle: activation, then accrual.
///
/// A stage that cannot run is recorded in the outcome and does not stop the
/// next one. Activation runs first so a pack activated in this cycle is
/// already `active` when accrual scans, but its activation day is today, so
/// it is not credited until tomorrow.
pub struct BatchCoordinator {
    activation: ActivationProcessor,
    accrual: AccrualProcessor,
    clock: Arc<dyn Clock>,
}

impl BatchCoordinator {
    pub fn new(
        store: LedgerStoreRef,
        sink: NotificationSinkRef,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            activation: ActivationProcessor::new(store.clone(), sink.clone(), clock.clone()),
            accrual: AccrualProcessor::new(
                store,
                sink,
                clock.clone(),
                settings.calendar,
                settings.max_concurrency,
            ),
            clock,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        self.run(CycleAction::FullCycle).await
    }

    /// Runs the stages selected by `action`.
    ///
    /// Returns `CycleFailed` only when every selected stage failed outright;
    /// partial failure comes back as an outcome with `errors` populated.
    pub async fn run(&self, action: CycleAction) -> Result<CycleOutcome> {
        let span = info_span!("cycle", %action);
        async move {
            let mut outcome = CycleOutcome::new(action, self.clock.now());
            let mut attempted = 0;

            if action.runs_activation() {
                attempted += 1;
                match self.activation.activate_pending_subscriptions().await {
                    Ok(summary) => outcome.activation = Some(summary),
                    Err(e) => record_stage_error(&mut outcome, Stage::Activation, &e),
                }
            }

            if action.runs_accrual() {
                attempted += 1;
                match self.accrual.process_daily_credits().await {
                    Ok(summary) => outcome.accrual = Some(summary),
                    Err(e) => record_stage_error(&mut outcome, Stage::Accrual, &e),
                }
            }

            outcome.finished_at = self.clock.now();

            if outcome.errors.len() == attempted {
                let detail = outcome
                    .errors
                    .iter()
                    .map(|e| format!("{:?}: {}", e.stage, e.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(EngineError::CycleFailed(detail));
            }

            info!(clean = outcome.is_clean(), "cycle finished");
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}

fn record_stage_error(outcome: &mut CycleOutcome, stage: Stage, e: &EngineError) {
    error!(?stage, error = %e, "stage failed");
    outcome.errors.push(StageError {
        stage,
        error: e.to_string(),
    });
}
