mod common;

use chrono::TimeDelta;
use common::{FaultyStore, pending, seed, t0};
use packledger::application::coordinator::{BatchCoordinator, EngineSettings};
use packledger::application::outcome::{CycleAction, Stage};
use packledger::domain::clock::{Clock, FixedClock};
use packledger::domain::money::Balance;
use packledger::domain::ports::{LedgerStore, LedgerStoreRef, NotificationSinkRef};
use packledger::domain::subscription::{SubscriptionId, SubscriptionStatus};
use packledger::domain::transaction::EntryKind;
use packledger::error::EngineError;
use packledger::infrastructure::in_memory::InMemoryLedgerStore;
use packledger::infrastructure::notify::RecordingNotificationSink;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn coordinator(store: LedgerStoreRef, clock: &Arc<FixedClock>) -> BatchCoordinator {
    let sink: NotificationSinkRef = Arc::new(RecordingNotificationSink::new());
    let clock: Arc<dyn Clock> = clock.clone();
    BatchCoordinator::new(store, sink, clock, EngineSettings::default())
}

#[tokio::test]
async fn test_overlapping_cycles_activate_and_credit_once() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed(store.as_ref(), 1..=20, t0()).await;
    let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(25)));

    let first = coordinator(store.clone(), &clock);
    let second = coordinator(store.clone(), &clock);

    let (a, b) = tokio::join!(first.run_cycle(), second.run_cycle());
    let (a, b) = (a.unwrap(), b.unwrap());
    let activated =
        a.activation.as_ref().unwrap().activated + b.activation.as_ref().unwrap().activated;
    assert_eq!(activated, 20);

    clock.advance(TimeDelta::days(1));
    let (a, b) = tokio::join!(first.run_cycle(), second.run_cycle());
    let (a, b) = (a.unwrap(), b.unwrap());
    let credited = a.accrual.as_ref().unwrap().credited + b.accrual.as_ref().unwrap().credited;
    assert_eq!(credited, 20);

    for id in 1..=20 {
        let sub = store.get_subscription(SubscriptionId(id)).await.unwrap().unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.total_credited(), Balance::new(dec!(1)));
        assert_eq!(sub.days_credited(), 1);

        let entries = store.entries_for(SubscriptionId(id)).await.unwrap();
        let earnings = entries
            .iter()
            .filter(|e| e.kind == EntryKind::DailyEarning)
            .count();
        let activations = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Activation)
            .count();
        assert_eq!((activations, earnings), (1, 1));
    }
}

#[tokio::test]
async fn test_failed_credit_does_not_block_others() {
    let store = Arc::new(FaultyStore::new().failing_credit_for(3));
    seed(store.as_ref(), 1..=5, t0()).await;
    let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(25)));
    let coordinator = coordinator(store.clone(), &clock);

    coordinator.run_cycle().await.unwrap();
    clock.advance(TimeDelta::days(1));
    let outcome = coordinator.run_cycle().await.unwrap();

    assert!(outcome.errors.is_empty());
    let accrual = outcome.accrual.unwrap();
    assert_eq!(accrual.credited, 4);
    assert_eq!(accrual.amount_credited, dec!(4));
    assert_eq!(accrual.failures.len(), 1);
    assert_eq!(accrual.failures[0].subscription_id, SubscriptionId(3));

    let failed = store.get_subscription(SubscriptionId(3)).await.unwrap().unwrap();
    assert_eq!(failed.total_credited(), Balance::ZERO);
    assert!(failed.last_credited_on().is_none());
}

#[tokio::test]
async fn test_failed_activation_reported_per_subscription() {
    let store = Arc::new(FaultyStore::new().failing_activation_for(2));
    seed(store.as_ref(), 1..=3, t0()).await;
    let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(25)));

    let outcome = coordinator(store.clone(), &clock)
        .run(CycleAction::ActivatePending)
        .await
        .unwrap();
    let activation = outcome.activation.unwrap();

    assert_eq!(activation.activated, 2);
    assert_eq!(activation.failures.len(), 1);
    assert_eq!(activation.failures[0].subscription_id, SubscriptionId(2));
    let still_pending = store.get_subscription(SubscriptionId(2)).await.unwrap().unwrap();
    assert_eq!(still_pending.status(), SubscriptionStatus::Pending);
}

#[tokio::test]
async fn test_stage_failure_does_not_stop_other_stage() {
    let store = Arc::new(FaultyStore::new());
    seed(store.as_ref(), [1], t0()).await;
    let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(25)));
    let coordinator = coordinator(store.clone(), &clock);
    coordinator.run_cycle().await.unwrap();

    store
        .fail_pending_scan
        .store(true, std::sync::atomic::Ordering::SeqCst);
    clock.advance(TimeDelta::days(1));
    let outcome = coordinator.run_cycle().await.unwrap();

    assert!(outcome.activation.is_none());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].stage, Stage::Activation);
    assert!(!outcome.is_clean());
    assert_eq!(outcome.accrual.unwrap().credited, 1);
}

#[tokio::test]
async fn test_all_stages_failing_is_cycle_failure() {
    let store = Arc::new(FaultyStore::new());
    seed(store.as_ref(), [1], t0()).await;
    store.fail_scans();
    let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(25)));
    let coordinator = coordinator(store, &clock);

    assert!(matches!(
        coordinator.run_cycle().await,
        Err(EngineError::CycleFailed(_))
    ));
    assert!(matches!(
        coordinator.run(CycleAction::ProcessEarnings).await,
        Err(EngineError::CycleFailed(_))
    ));
}

#[tokio::test]
async fn test_store_usable_as_trait_object_across_tasks() {
    let store: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());

    let writer = store.clone();
    tokio::spawn(async move { writer.insert_subscription(pending(7, t0())).await })
        .await
        .unwrap()
        .unwrap();

    let reader = store.clone();
    let found = tokio::spawn(async move { reader.get_subscription(SubscriptionId(7)).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.unwrap().id, SubscriptionId(7));
}

#[tokio::test]
async fn test_notification_outage_keeps_ledger_changes() {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed(store.as_ref(), [1], t0()).await;
    let clock = Arc::new(FixedClock::new(t0() + TimeDelta::hours(25)));
    let sink = Arc::new(RecordingNotificationSink::failing());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let coordinator =
        BatchCoordinator::new(store.clone(), sink.clone(), dyn_clock, EngineSettings::default());

    let outcome = coordinator.run_cycle().await.unwrap();
    assert_eq!(outcome.activation.unwrap().notification_failures, 1);

    clock.advance(TimeDelta::days(1));
    let outcome = coordinator.run_cycle().await.unwrap();
    let accrual = outcome.accrual.unwrap();
    assert_eq!(accrual.credited, 1);
    assert_eq!(accrual.notification_failures, 1);

    let sub = store.get_subscription(SubscriptionId(1)).await.unwrap().unwrap();
    assert_eq!(sub.total_credited(), Balance::new(dec!(1)));
    assert!(sink.sent().await.is_empty());
}
