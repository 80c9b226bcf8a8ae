// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for investment allocation
//!
//! These tests drive the full allocation pipeline:
//! 1. Register an app and activate its milestone plan
//! 2. Convert investor payments into percentage allocations
//! 3. Enforce the no-oversell invariant under the app lock
//! 4. Close the round at full subscription and charge the platform fee
//! 5. Unwind allocations on refund

use std::sync::Arc;

use rust_decimal::Decimal;

use escrow_core::application::{AllocationService, AppService, EscrowLedgerService, MilestoneService};
use escrow_core::domain::app::{AppStatus, AppSubmission};
use escrow_core::domain::error::{EngineError, InvariantViolation, ValidationError};
use escrow_core::domain::events::EscrowEvent;
use escrow_core::domain::ids::{AppId, UserId};
use escrow_core::domain::milestone::MilestoneDetails;
use escrow_core::domain::primitives::UseOfFunds;
use escrow_core::domain::store::LedgerStore;
use escrow_core::infrastructure::event_bus::EscrowEventBus;
use escrow_core::infrastructure::InMemoryLedger;

struct TestEngine {
    store: Arc<InMemoryLedger>,
    events: Arc<EscrowEventBus>,
    apps: AppService,
    milestones: MilestoneService,
    allocations: AllocationService,
    ledger: EscrowLedgerService,
}

fn engine() -> TestEngine {
    let store = Arc::new(InMemoryLedger::new());
    let events = Arc::new(EscrowEventBus::with_default_capacity());
    TestEngine {
        apps: AppService::new(store.clone()),
        milestones: MilestoneService::new(store.clone(), events.clone()),
        allocations: AllocationService::new(store.clone(), events.clone(), "5.00".parse().unwrap()),
        ledger: EscrowLedgerService::new(store.clone()),
        store,
        events,
    }
}

fn submission(developer: UserId) -> AppSubmission {
    AppSubmission {
        name: "meal-planner".to_string(),
        developer,
        currency: "NGN".to_string(),
        exchange_rate: Decimal::ONE,
        funding_goal: "10000.00".parse().unwrap(),
        available_percentage: "20.00".parse().unwrap(),
        min_investment_percentage: "0.50".parse().unwrap(),
        lock_in_period_days: 180,
        use_of_funds: UseOfFunds::empty(),
    }
}

fn details(title: &str, release: &str) -> MilestoneDetails {
    MilestoneDetails {
        title: title.to_string(),
        description: format!("{title} deliverables"),
        target_date: chrono::Utc::now().date_naive(),
        release_percentage: release.parse().unwrap(),
    }
}

/// Registers an app with a 60/40 milestone plan and opens it for investment
async fn active_app(engine: &TestEngine) -> AppId {
    let app = engine
        .apps
        .register(submission(UserId::new()))
        .await
        .expect("Failed to register app");
    engine
        .milestones
        .add_milestone(app.id, details("mvp", "60.00"))
        .await
        .expect("Failed to add milestone");
    engine
        .milestones
        .add_milestone(app.id, details("beta launch", "40.00"))
        .await
        .expect("Failed to add milestone");
    engine
        .milestones
        .activate_app(app.id)
        .await
        .expect("Failed to activate app");
    app.id
}

#[tokio::test]
async fn test_allocation_priced_at_listed_valuation() {
    let engine = engine();
    let app_id = active_app(&engine).await;
    let investor = UserId::new();

    // 20% of the company for 10000.00 values it at 50000.00, so 5000.00
    // buys exactly 10.00%
    let investment = engine
        .allocations
        .allocate(investor, app_id, "5000.00".parse().unwrap())
        .await
        .expect("Allocation failed");

    assert_eq!(investment.percentage_bought, "10.00".parse().unwrap());
    assert_eq!(investment.amount_paid, "5000.00".parse().unwrap());

    let app = engine.apps.get(app_id).await.unwrap();
    assert_eq!(app.remaining_percentage, "10.00".parse().unwrap());
    assert_eq!(app.funds_in_escrow, "5000.00".parse().unwrap());
    assert_eq!(app.status, AppStatus::Active);

    // ownership and the deposit entry landed in the same transaction
    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let ownership = session.ownership(investor).await.unwrap().unwrap();
    assert_eq!(ownership.percentage_owned, "10.00".parse().unwrap());
    assert_eq!(session.entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_oversell_rejected_without_partial_writes() {
    let engine = engine();
    let app_id = active_app(&engine).await;

    engine
        .allocations
        .allocate(UserId::new(), app_id, "5000.00".parse().unwrap())
        .await
        .unwrap();

    // 6000.00 would buy 12.00% against the 10.00% still unsold
    let late_investor = UserId::new();
    let err = engine
        .allocations
        .allocate(late_investor, app_id, "6000.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Invariant(InvariantViolation::OversellRejected { .. })
    ));

    // the rejected allocation left nothing behind
    let app = engine.apps.get(app_id).await.unwrap();
    assert_eq!(app.remaining_percentage, "10.00".parse().unwrap());
    assert_eq!(app.funds_in_escrow, "5000.00".parse().unwrap());

    let mut session = engine.store.lock_app(app_id).await.unwrap();
    assert_eq!(session.investments().await.unwrap().len(), 1);
    assert_eq!(session.entries().await.unwrap().len(), 1);
    assert!(session.ownership(late_investor).await.unwrap().is_none());
}

#[tokio::test]
async fn test_below_minimum_investment_rejected() {
    let engine = engine();
    let app_id = active_app(&engine).await;

    // 100.00 buys 0.20%, below the 0.50% floor
    let err = engine
        .allocations
        .allocate(UserId::new(), app_id, "100.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::BelowMinimumInvestment { .. })
    ));
}

#[tokio::test]
async fn test_non_positive_amount_rejected() {
    let engine = engine();
    let app_id = active_app(&engine).await;

    let err = engine
        .allocations
        .allocate(UserId::new(), app_id, "0.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::NonPositiveAmount { .. })
    ));
}

#[tokio::test]
async fn test_full_subscription_closes_round_and_charges_fee() {
    let engine = engine();
    let app_id = active_app(&engine).await;
    let whale = UserId::new();
    let mut rx = engine.events.subscribe();

    engine
        .allocations
        .allocate(whale, app_id, "10000.00".parse().unwrap())
        .await
        .unwrap();

    let app = engine.apps.get(app_id).await.unwrap();
    assert_eq!(app.status, AppStatus::Funded);
    assert!(app.remaining_percentage.is_zero());
    assert_eq!(app.funds_in_escrow, "10000.00".parse().unwrap());

    // 5% platform fee on the 10000.00 goal
    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let fee = session.find_platform_fee().await.unwrap().unwrap();
    assert_eq!(fee.amount, "500.00".parse().unwrap());
    drop(session);

    let first = rx.try_recv().unwrap();
    assert!(matches!(first, EscrowEvent::InvestmentAllocated { .. }));
    let second = rx.try_recv().unwrap();
    assert!(matches!(second, EscrowEvent::AppFullyFunded { .. }));
}

#[tokio::test]
async fn test_refund_reopens_a_funded_round() {
    let engine = engine();
    let app_id = active_app(&engine).await;
    let whale = UserId::new();

    let investment = engine
        .allocations
        .allocate(whale, app_id, "10000.00".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(
        engine.apps.get(app_id).await.unwrap().status,
        AppStatus::Funded
    );

    engine
        .allocations
        .refund_investment(app_id, investment.id)
        .await
        .expect("Refund failed");

    let app = engine.apps.get(app_id).await.unwrap();
    assert_eq!(app.status, AppStatus::Active);
    assert_eq!(app.remaining_percentage, "20.00".parse().unwrap());
    assert_eq!(app.funds_in_escrow, "0.00".parse().unwrap());

    let summary = engine.ledger.summary(app_id).await.unwrap();
    assert_eq!(summary.physical_balance, "0.00".parse().unwrap());

    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let ownership = session.ownership(whale).await.unwrap().unwrap();
    assert!(ownership.percentage_owned.is_zero());
    // deposit plus the compensating refund stay on the ledger
    assert_eq!(session.entries().await.unwrap().len(), 2);
    assert!(session.investments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_allocation_requires_active_listing() {
    let engine = engine();
    let app = engine
        .apps
        .register(submission(UserId::new()))
        .await
        .unwrap();

    // still PENDING, no activated milestone plan
    let err = engine
        .allocations
        .allocate(UserId::new(), app.id, "5000.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));
}

#[tokio::test]
async fn test_held_app_rejects_allocations_until_resumed() {
    let engine = engine();
    let app_id = active_app(&engine).await;

    engine.apps.put_on_hold(app_id).await.unwrap();
    let err = engine
        .allocations
        .allocate(UserId::new(), app_id, "5000.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));

    engine.apps.resume(app_id).await.unwrap();
    engine
        .allocations
        .allocate(UserId::new(), app_id, "5000.00".parse().unwrap())
        .await
        .expect("Allocation after resume failed");
}
