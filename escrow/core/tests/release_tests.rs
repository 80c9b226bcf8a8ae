// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the release payout workflow
//!
//! These tests drive a verified milestone's release through approval, the
//! gateway transfer, and settlement against the escrow ledger:
//! 1. Approval gating before any money moves
//! 2. Exactly-once debit across process, retry, and crash-shaped reruns
//! 3. Gateway failures leaving the ledger untouched
//! 4. Rollback of a settled payout and the retry that follows it

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use escrow_core::application::{AllocationService, AppService, MilestoneService, ReleaseService};
use escrow_core::domain::app::{AppStatus, AppSubmission};
use escrow_core::domain::error::EngineError;
use escrow_core::domain::escrow::TransactionKind;
use escrow_core::domain::events::EscrowEvent;
use escrow_core::domain::gateway::{
    ConfirmedPayment, GatewayError, PaymentGateway, RecipientAccount, TransferReceipt,
    TransferState,
};
use escrow_core::domain::ids::{AppId, TransactionId, UserId};
use escrow_core::domain::milestone::{MilestoneDetails, ProjectMilestone};
use escrow_core::domain::primitives::{Money, UseOfFunds};
use escrow_core::domain::release::{Release, ReleaseStatus};
use escrow_core::domain::store::LedgerStore;
use escrow_core::infrastructure::event_bus::EscrowEventBus;
use escrow_core::infrastructure::InMemoryLedger;

/// Gateway double with a scripted outcome per initiated transfer. An empty
/// script means every transfer succeeds.
struct MockGateway {
    plan: Mutex<VecDeque<Result<TransferState, GatewayError>>>,
    last_transfer: Mutex<Option<(Money, String)>>,
    initiated: AtomicUsize,
    verified: AtomicUsize,
}

impl MockGateway {
    fn always_succeeds() -> Arc<Self> {
        Self::scripted(vec![])
    }

    fn scripted(plan: Vec<Result<TransferState, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(plan.into()),
            last_transfer: Mutex::new(None),
            initiated: AtomicUsize::new(0),
            verified: AtomicUsize::new(0),
        })
    }

    fn transfers_initiated(&self) -> usize {
        self.initiated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate_transfer(
        &self,
        _recipient: &RecipientAccount,
        amount: Money,
        currency: &str,
    ) -> Result<TransferReceipt, GatewayError> {
        let attempt = self.initiated.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_transfer.lock().await = Some((amount, currency.to_string()));
        let state = self
            .plan
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(TransferState::Success))?;
        Ok(TransferReceipt {
            reference: format!("MOCK-{attempt}"),
            state,
            amount,
            currency: currency.to_string(),
        })
    }

    async fn verify_transaction(&self, reference: &str) -> Result<TransferReceipt, GatewayError> {
        self.verified.fetch_add(1, Ordering::SeqCst);
        let (amount, currency) = self
            .last_transfer
            .lock()
            .await
            .clone()
            .expect("verify_transaction called before any transfer");
        Ok(TransferReceipt {
            reference: reference.to_string(),
            state: TransferState::Success,
            amount,
            currency,
        })
    }

    fn confirm_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> Result<ConfirmedPayment, GatewayError> {
        Err(GatewayError::InvalidSignature)
    }
}

struct TestEngine {
    store: Arc<InMemoryLedger>,
    events: Arc<EscrowEventBus>,
    gateway: Arc<MockGateway>,
    apps: AppService,
    milestones: MilestoneService,
    allocations: AllocationService,
    releases: ReleaseService,
}

fn engine_with(gateway: Arc<MockGateway>) -> TestEngine {
    let store = Arc::new(InMemoryLedger::new());
    let events = Arc::new(EscrowEventBus::with_default_capacity());
    TestEngine {
        apps: AppService::new(store.clone()),
        milestones: MilestoneService::new(store.clone(), events.clone()),
        allocations: AllocationService::new(store.clone(), events.clone(), "5.00".parse().unwrap()),
        releases: ReleaseService::new(store.clone(), gateway.clone(), events.clone()),
        gateway,
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

fn recipient(developer: UserId) -> RecipientAccount {
    RecipientAccount {
        user: developer,
        account_name: "Chidi Okafor".to_string(),
        account_number: "0123456789".to_string(),
        bank_code: "058".to_string(),
    }
}

/// Fully subscribed app with a 60/40 milestone plan.
async fn funded_round(engine: &TestEngine) -> (AppId, UserId, ProjectMilestone, ProjectMilestone) {
    let developer = UserId::new();
    let app = engine
        .apps
        .register(submission(developer))
        .await
        .expect("Failed to register app");
    let m1 = engine
        .milestones
        .add_milestone(app.id, details("mvp", "60.00"))
        .await
        .unwrap();
    let m2 = engine
        .milestones
        .add_milestone(app.id, details("beta launch", "40.00"))
        .await
        .unwrap();
    engine.milestones.activate_app(app.id).await.unwrap();
    engine
        .allocations
        .allocate(UserId::new(), app.id, "10000.00".parse().unwrap())
        .await
        .expect("Full subscription failed");
    (app.id, developer, m1, m2)
}

/// Drives the milestone to VERIFIED and returns the release that opened.
async fn verified_release(
    engine: &TestEngine,
    app_id: AppId,
    milestone: &ProjectMilestone,
) -> Release {
    engine
        .milestones
        .start_milestone(app_id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .update_progress(app_id, milestone.id, 100)
        .await
        .unwrap();
    engine
        .milestones
        .request_verification(app_id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .verify(app_id, milestone.id, UserId::new(), None)
        .await
        .expect("Verification failed")
}

async fn approve_release(engine: &TestEngine, app_id: AppId, release: &Release, developer: UserId) {
    engine
        .releases
        .request_approval(app_id, release.id, developer)
        .await
        .unwrap();
    engine
        .releases
        .approve(app_id, release.id, UserId::new(), None)
        .await
        .unwrap();
}

async fn funds_in_escrow(engine: &TestEngine, app_id: AppId) -> Money {
    engine.apps.get(app_id).await.unwrap().funds_in_escrow
}

async fn milestone_release_entry(engine: &TestEngine, app_id: AppId) -> Option<TransactionId> {
    let mut session = engine.store.lock_app(app_id).await.unwrap();
    session
        .entries()
        .await
        .unwrap()
        .iter()
        .find(|e| e.kind == TransactionKind::MilestoneRelease)
        .map(|e| e.id)
}

#[tokio::test]
async fn test_approved_payout_settles_and_debits_once() {
    let engine = engine_with(MockGateway::always_succeeds());
    let (app_id, developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;
    approve_release(&engine, app_id, &release, developer).await;

    let mut rx = engine.events.subscribe();
    let settled = engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .expect("Payout failed");

    assert_eq!(settled.status, ReleaseStatus::Completed);
    assert_eq!(settled.transaction_reference.as_deref(), Some("MOCK-1"));
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "6000.00".parse().unwrap()
    );
    assert!(milestone_release_entry(&engine, app_id).await.is_some());
    assert!(matches!(
        rx.try_recv().unwrap(),
        EscrowEvent::ReleaseCompleted { .. }
    ));

    // reprocessing a settled release touches neither gateway nor balance
    let again = engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .unwrap();
    assert_eq!(again.status, ReleaseStatus::Completed);
    assert_eq!(engine.gateway.transfers_initiated(), 1);
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "6000.00".parse().unwrap()
    );

    // the payout settled, so the milestone can finalize
    engine
        .milestones
        .mark_completed(app_id, m2.id)
        .await
        .expect("Milestone completion failed");
}

#[tokio::test]
async fn test_processing_requires_approval() {
    let engine = engine_with(MockGateway::always_succeeds());
    let (app_id, developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;

    let err = engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));

    // nothing moved
    assert_eq!(engine.gateway.transfers_initiated(), 0);
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "10000.00".parse().unwrap()
    );
}

#[tokio::test]
async fn test_gateway_decline_fails_release_without_debit() {
    let engine = engine_with(MockGateway::scripted(vec![Err(GatewayError::Declined(
        "insufficient balance".to_string(),
    ))]));
    let (app_id, developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;
    approve_release(&engine, app_id, &release, developer).await;

    let mut rx = engine.events.subscribe();
    let err = engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Gateway(GatewayError::Declined(_))
    ));

    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let stored = session.find_release(release.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReleaseStatus::Failed);
    assert!(stored
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .contains("insufficient balance"));
    // no anchor entry means no debit happened
    let entries = session.entries().await.unwrap();
    assert!(entries
        .iter()
        .all(|e| e.kind != TransactionKind::MilestoneRelease));
    drop(session);

    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "10000.00".parse().unwrap()
    );
    assert!(matches!(
        rx.try_recv().unwrap(),
        EscrowEvent::ReleaseFailed { .. }
    ));
}

#[tokio::test]
async fn test_retry_settles_exactly_once() {
    let engine = engine_with(MockGateway::scripted(vec![Err(GatewayError::Declined(
        "temporary outage".to_string(),
    ))]));
    let (app_id, developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;
    approve_release(&engine, app_id, &release, developer).await;

    assert!(engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .is_err());

    let admin = UserId::new();
    let settled = engine
        .releases
        .retry(app_id, release.id, admin, &recipient(developer))
        .await
        .expect("Retry failed");
    assert_eq!(settled.status, ReleaseStatus::Completed);
    assert_eq!(settled.transaction_reference.as_deref(), Some("MOCK-2"));
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "6000.00".parse().unwrap()
    );

    // a second retry finds the settled anchor and changes nothing
    let again = engine
        .releases
        .retry(app_id, release.id, admin, &recipient(developer))
        .await
        .unwrap();
    assert_eq!(again.status, ReleaseStatus::Completed);
    assert_eq!(engine.gateway.transfers_initiated(), 2);
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "6000.00".parse().unwrap()
    );
}

#[tokio::test]
async fn test_pending_transfer_verified_before_settlement() {
    let engine = engine_with(MockGateway::scripted(vec![Ok(TransferState::Pending)]));
    let (app_id, developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;
    approve_release(&engine, app_id, &release, developer).await;

    let settled = engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .expect("Payout failed");

    assert_eq!(settled.status, ReleaseStatus::Completed);
    assert_eq!(engine.gateway.verified.load(Ordering::SeqCst), 1);
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "6000.00".parse().unwrap()
    );
}

#[tokio::test]
async fn test_rollback_recredits_escrow_and_allows_retry() {
    let engine = engine_with(MockGateway::always_succeeds());
    let (app_id, developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;
    approve_release(&engine, app_id, &release, developer).await;
    engine
        .releases
        .process(app_id, release.id, &recipient(developer))
        .await
        .unwrap();

    let entry_id = milestone_release_entry(&engine, app_id)
        .await
        .expect("settled payout entry missing");
    engine
        .releases
        .rollback(app_id, entry_id, "payout bounced at the bank".to_string())
        .await
        .expect("Rollback failed");

    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "10000.00".parse().unwrap()
    );
    let mut session = engine.store.lock_app(app_id).await.unwrap();
    let stored = session.find_release(release.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReleaseStatus::Failed);
    drop(session);

    // a reversal is recorded once; rolling back the same entry again fails
    assert!(engine
        .releases
        .rollback(app_id, entry_id, "double reversal".to_string())
        .await
        .is_err());

    // the reversed anchor no longer counts, so a retry pays out again
    let settled = engine
        .releases
        .retry(app_id, release.id, UserId::new(), &recipient(developer))
        .await
        .expect("Retry after rollback failed");
    assert_eq!(settled.status, ReleaseStatus::Completed);
    assert_eq!(engine.gateway.transfers_initiated(), 2);
    assert_eq!(
        funds_in_escrow(&engine, app_id).await,
        "6000.00".parse().unwrap()
    );
}

#[tokio::test]
async fn test_replacement_release_after_rejection() {
    let engine = engine_with(MockGateway::always_succeeds());
    let (app_id, _developer, _m1, m2) = funded_round(&engine).await;
    let release = verified_release(&engine, app_id, &m2).await;

    engine
        .releases
        .reject(
            app_id,
            release.id,
            UserId::new(),
            "milestone double-counted".to_string(),
        )
        .await
        .unwrap();

    let replacement = engine
        .releases
        .request_new(app_id, m2.id)
        .await
        .expect("Replacement release failed");
    assert_eq!(replacement.amount, "4000.00".parse().unwrap());
    assert_eq!(replacement.status, ReleaseStatus::Pending);

    // only one live release per milestone
    let err = engine.releases.request_new(app_id, m2.id).await.unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));
}

#[tokio::test]
async fn test_full_round_settles_all_milestones_and_completes_app() {
    let engine = engine_with(MockGateway::always_succeeds());
    let (app_id, developer, m1, m2) = funded_round(&engine).await;

    for milestone in [&m1, &m2] {
        let release = verified_release(&engine, app_id, milestone).await;
        approve_release(&engine, app_id, &release, developer).await;
        engine
            .releases
            .process(app_id, release.id, &recipient(developer))
            .await
            .expect("Payout failed");
        engine
            .milestones
            .mark_completed(app_id, milestone.id)
            .await
            .expect("Milestone completion failed");
    }

    let app = engine.apps.get(app_id).await.unwrap();
    assert_eq!(app.status, AppStatus::Completed);
    assert_eq!(app.funds_in_escrow, "0.00".parse().unwrap());
    assert_eq!(engine.gateway.transfers_initiated(), 2);
}
