//! Application layer containing the batch processing orchestration.
//!
//! The `BatchCoordinator` is the entry point for one processing cycle. It
//! drives the `ActivationProcessor` and the `AccrualProcessor` over the
//! ledger port and dispatches notifications through post-commit hooks.

pub mod accrual;
pub mod activation;
pub mod coordinator;
pub mod hooks;
pub mod outcome;
