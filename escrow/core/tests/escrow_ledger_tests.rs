// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the escrow ledger service
//!
//! Exercises the operator-facing ledger operations directly, without the
//! allocation or release workflows on top:
//! 1. Releases are bounded by the available balance
//! 2. Partial refunds track what remains refundable against a deposit
//! 3. The summary numbers stay mutually consistent

use std::sync::Arc;

use rust_decimal::Decimal;

use escrow_core::application::{AppService, EscrowLedgerService};
use escrow_core::domain::app::AppSubmission;
use escrow_core::domain::error::{EngineError, InvariantViolation, ValidationError};
use escrow_core::domain::escrow::{TransactionKind, TransactionStatus};
use escrow_core::domain::ids::{AppId, UserId};
use escrow_core::domain::primitives::{Money, UseOfFunds};
use escrow_core::domain::store::LedgerStore;
use escrow_core::infrastructure::InMemoryLedger;

struct TestEngine {
    store: Arc<InMemoryLedger>,
    apps: AppService,
    ledger: EscrowLedgerService,
}

fn engine() -> TestEngine {
    let store = Arc::new(InMemoryLedger::new());
    TestEngine {
        apps: AppService::new(store.clone()),
        ledger: EscrowLedgerService::new(store.clone()),
        store,
    }
}

/// A registered listing is enough; the ledger operations do not require an
/// open funding round.
async fn registered_app(engine: &TestEngine) -> AppId {
    let app = engine
        .apps
        .register(AppSubmission {
            name: "meal-planner".to_string(),
            developer: UserId::new(),
            currency: "NGN".to_string(),
            exchange_rate: Decimal::ONE,
            funding_goal: "10000.00".parse().unwrap(),
            available_percentage: "20.00".parse().unwrap(),
            min_investment_percentage: "0.50".parse().unwrap(),
            lock_in_period_days: 180,
            use_of_funds: UseOfFunds::empty(),
        })
        .await
        .expect("Failed to register app");
    app.id
}

async fn funds_in_escrow(engine: &TestEngine, app_id: AppId) -> Money {
    engine.apps.get(app_id).await.unwrap().funds_in_escrow
}

#[tokio::test]
async fn test_release_bounded_by_available_balance() {
    let engine = engine();
    let app_id = registered_app(&engine).await;
    let investor = UserId::new();
    let recipient = UserId::new();

    engine
        .ledger
        .deposit(app_id, investor, "1000.00".parse().unwrap())
        .await
        .expect("Deposit failed");
    engine
        .ledger
        .release(app_id, recipient, "600.00".parse().unwrap(), None)
        .await
        .expect("Release within balance failed");

    let err = engine
        .ledger
        .release(app_id, recipient, "500.00".parse().unwrap(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Invariant(InvariantViolation::InsufficientEscrowFunds { .. })
    ));

    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "400.00".parse().unwrap()
    );
}

#[tokio::test]
async fn test_partial_refunds_track_remaining() {
    let engine = engine();
    let app_id = registered_app(&engine).await;
    let investor = UserId::new();

    let deposit = engine
        .ledger
        .deposit(app_id, investor, "1000.00".parse().unwrap())
        .await
        .unwrap();

    // half back: a partial refund against a still-live deposit
    let first = engine
        .ledger
        .refund_deposit(app_id, deposit.id, "50.00".parse().unwrap())
        .await
        .expect("Partial refund failed");
    assert_eq!(first.kind, TransactionKind::PartialRefund);
    assert_eq!(first.amount, "500.00".parse().unwrap());

    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let stored = session.find_entry(deposit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::PartiallyRefunded);
    drop(session);

    // the remaining half: percentages apply to the original amount, and
    // exhausting the deposit closes it out
    let second = engine
        .ledger
        .refund_deposit(app_id, deposit.id, "50.00".parse().unwrap())
        .await
        .expect("Final refund failed");
    assert_eq!(second.kind, TransactionKind::Refund);
    assert_eq!(second.amount, "500.00".parse().unwrap());

    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let stored = session.find_entry(deposit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Refunded);
    drop(session);

    // nothing is left to refund
    let err = engine
        .ledger
        .refund_deposit(app_id, deposit.id, "10.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Invariant(InvariantViolation::InsufficientEscrowFunds { .. })
    ));

    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "0.00".parse().unwrap()
    );
}

#[tokio::test]
async fn test_refund_percentage_range_validated() {
    let engine = engine();
    let app_id = registered_app(&engine).await;
    let deposit = engine
        .ledger
        .deposit(app_id, UserId::new(), "1000.00".parse().unwrap())
        .await
        .unwrap();

    let err = engine
        .ledger
        .refund_deposit(app_id, deposit.id, "150.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::RefundPercentageOutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_summary_consistency() {
    let engine = engine();
    let app_id = registered_app(&engine).await;

    engine
        .ledger
        .deposit(app_id, UserId::new(), "1000.00".parse().unwrap())
        .await
        .unwrap();
    engine
        .ledger
        .deposit(app_id, UserId::new(), "2000.00".parse().unwrap())
        .await
        .unwrap();
    engine
        .ledger
        .release(app_id, UserId::new(), "500.00".parse().unwrap(), None)
        .await
        .unwrap();

    let summary = engine.ledger.summary(app_id).await.unwrap();
    assert_eq!(summary.total_deposits, "3000.00".parse().unwrap());
    assert_eq!(summary.total_releases, "500.00".parse().unwrap());
    assert_eq!(summary.total_refunds, "0.00".parse().unwrap());
    assert_eq!(summary.funds_in_dispute, "0.00".parse().unwrap());
    assert_eq!(summary.physical_balance, "2500.00".parse().unwrap());
    assert_eq!(summary.available_balance, "2500.00".parse().unwrap());
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        summary.physical_balance
    );
}

#[tokio::test]
async fn test_deposit_rejects_non_positive() {
    let engine = engine();
    let app_id = registered_app(&engine).await;

    let err = engine
        .ledger
        .deposit(app_id, UserId::new(), "0.00".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::NonPositiveAmount { .. })
    ));
}
