// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for secondary share transfers
//!
//! Covers the resale path between investors:
//! 1. The lock-in window keeps early positions off the market
//! 2. Completion moves ownership seller to buyer atomically
//! 3. A seller can never move more than they hold

use std::sync::Arc;

use rust_decimal::Decimal;

use escrow_core::application::{AllocationService, AppService, MilestoneService, TransferService};
use escrow_core::domain::app::AppSubmission;
use escrow_core::domain::error::{EngineError, InvariantViolation, ValidationError};
use escrow_core::domain::events::EscrowEvent;
use escrow_core::domain::ids::{AppId, UserId};
use escrow_core::domain::milestone::MilestoneDetails;
use escrow_core::domain::primitives::{Percentage, UseOfFunds};
use escrow_core::domain::store::LedgerStore;
use escrow_core::domain::transfer::TransferStatus;
use escrow_core::infrastructure::event_bus::EscrowEventBus;
use escrow_core::infrastructure::InMemoryLedger;

struct TestEngine {
    store: Arc<InMemoryLedger>,
    events: Arc<EscrowEventBus>,
    apps: AppService,
    milestones: MilestoneService,
    allocations: AllocationService,
    transfers: TransferService,
}

fn engine() -> TestEngine {
    let store = Arc::new(InMemoryLedger::new());
    let events = Arc::new(EscrowEventBus::with_default_capacity());
    TestEngine {
        apps: AppService::new(store.clone()),
        milestones: MilestoneService::new(store.clone(), events.clone()),
        allocations: AllocationService::new(store.clone(), events.clone(), "5.00".parse().unwrap()),
        transfers: TransferService::new(store.clone(), events.clone()),
        store,
        events,
    }
}

fn submission(developer: UserId, lock_in_period_days: u32) -> AppSubmission {
    AppSubmission {
        name: "meal-planner".to_string(),
        developer,
        currency: "NGN".to_string(),
        exchange_rate: Decimal::ONE,
        funding_goal: "10000.00".parse().unwrap(),
        available_percentage: "20.00".parse().unwrap(),
        min_investment_percentage: "0.50".parse().unwrap(),
        lock_in_period_days,
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

/// Active app whose seller already holds a 10% position.
async fn app_with_position(engine: &TestEngine, lock_in_days: u32) -> (AppId, UserId) {
    let developer = UserId::new();
    let app = engine
        .apps
        .register(submission(developer, lock_in_days))
        .await
        .expect("Failed to register app");
    engine
        .milestones
        .add_milestone(app.id, details("mvp", "60.00"))
        .await
        .unwrap();
    engine
        .milestones
        .add_milestone(app.id, details("beta launch", "40.00"))
        .await
        .unwrap();
    engine.milestones.activate_app(app.id).await.unwrap();

    let seller = UserId::new();
    engine
        .allocations
        .allocate(seller, app.id, "5000.00".parse().unwrap())
        .await
        .expect("Seed allocation failed");
    (app.id, seller)
}

async fn holding(engine: &TestEngine, app_id: AppId, user: UserId) -> Percentage {
    let mut session = engine.store.lock_app(app_id).await.unwrap();
    session
        .ownership(user)
        .await
        .unwrap()
        .map(|o| o.percentage_owned)
        .unwrap_or(Percentage::ZERO)
}

#[tokio::test]
async fn test_lock_in_window_blocks_resale() {
    let engine = engine();
    let (app_id, seller) = app_with_position(&engine, 180).await;

    let err = engine
        .transfers
        .open_transfer(
            app_id,
            seller,
            UserId::new(),
            "4.00".parse().unwrap(),
            "600.00".parse().unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::WithinLockInPeriod { .. })
    ));
}

#[tokio::test]
async fn test_resale_after_lock_in_moves_ownership() {
    let engine = engine();
    let (app_id, seller) = app_with_position(&engine, 0).await;
    let buyer = UserId::new();

    let transfer = engine
        .transfers
        .open_transfer(
            app_id,
            seller,
            buyer,
            "4.00".parse().unwrap(),
            "600.00".parse().unwrap(),
        )
        .await
        .expect("Failed to open transfer");
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.total_amount, "2400.00".parse().unwrap());
    assert_eq!(transfer.currency, "NGN");

    let mut rx = engine.events.subscribe();
    let settled = engine
        .transfers
        .complete_transfer(app_id, transfer.id, None)
        .await
        .expect("Failed to complete transfer");
    assert_eq!(settled.status, TransferStatus::Completed);
    assert!(settled.completed_at.is_some());

    assert_eq!(holding(&engine, app_id, seller).await, "6.00".parse().unwrap());
    assert_eq!(holding(&engine, app_id, buyer).await, "4.00".parse().unwrap());
    assert!(matches!(
        rx.try_recv().unwrap(),
        EscrowEvent::SharesTransferred { .. }
    ));
}

#[tokio::test]
async fn test_transfer_bounded_by_ownership() {
    let engine = engine();
    let (app_id, seller) = app_with_position(&engine, 0).await;

    let err = engine
        .transfers
        .open_transfer(
            app_id,
            seller,
            UserId::new(),
            "12.00".parse().unwrap(),
            "600.00".parse().unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Invariant(InvariantViolation::InsufficientOwnership { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_transfer_cannot_complete() {
    let engine = engine();
    let (app_id, seller) = app_with_position(&engine, 0).await;
    let buyer = UserId::new();

    let transfer = engine
        .transfers
        .open_transfer(
            app_id,
            seller,
            buyer,
            "4.00".parse().unwrap(),
            "600.00".parse().unwrap(),
        )
        .await
        .unwrap();
    engine
        .transfers
        .cancel_transfer(app_id, transfer.id)
        .await
        .unwrap();

    let err = engine
        .transfers
        .complete_transfer(app_id, transfer.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));

    // ownership never moved
    assert_eq!(
        holding(&engine, app_id, seller).await,
        "10.00".parse().unwrap()
    );
    assert_eq!(holding(&engine, app_id, buyer).await, Percentage::ZERO);

    let transfers = engine.transfers.list_transfers(app_id).await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].status, TransferStatus::Cancelled);
}
