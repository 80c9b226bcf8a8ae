// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the milestone plan and verification flow
//!
//! These tests verify the plan's activation rules and the verification
//! handoff that opens a Release:
//! 1. Author the plan while the app is PENDING
//! 2. Activate only when percentages sum to exactly 100
//! 3. Gate verification on 100% reported progress
//! 4. Open a release sized as the milestone's share of the funding goal
//! 5. Send rejected milestones back for rework

use std::sync::Arc;

use rust_decimal::Decimal;

use escrow_core::application::{AppService, MilestoneService};
use escrow_core::domain::app::{App, AppSubmission};
use escrow_core::domain::error::{EngineError, ValidationError};
use escrow_core::domain::events::EscrowEvent;
use escrow_core::domain::ids::UserId;
use escrow_core::domain::milestone::{MilestoneDetails, MilestoneStatus};
use escrow_core::domain::primitives::UseOfFunds;
use escrow_core::domain::release::ReleaseStatus;
use escrow_core::domain::store::LedgerStore;
use escrow_core::infrastructure::event_bus::EscrowEventBus;
use escrow_core::infrastructure::InMemoryLedger;

struct TestEngine {
    store: Arc<InMemoryLedger>,
    events: Arc<EscrowEventBus>,
    apps: AppService,
    milestones: MilestoneService,
}

fn engine() -> TestEngine {
    let store = Arc::new(InMemoryLedger::new());
    let events = Arc::new(EscrowEventBus::with_default_capacity());
    TestEngine {
        apps: AppService::new(store.clone()),
        milestones: MilestoneService::new(store.clone(), events.clone()),
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

async fn registered_app(engine: &TestEngine) -> App {
    engine
        .apps
        .register(submission(UserId::new()))
        .await
        .expect("Failed to register app")
}

#[tokio::test]
async fn test_activation_requires_two_milestones() {
    let engine = engine();
    let app = registered_app(&engine).await;

    engine
        .milestones
        .add_milestone(app.id, details("everything at once", "100.00"))
        .await
        .unwrap();

    let err = engine.milestones.activate_app(app.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::TooFewMilestones { count: 1 })
    ));
}

#[tokio::test]
async fn test_activation_requires_plan_summing_to_100() {
    let engine = engine();
    let app = registered_app(&engine).await;

    engine
        .milestones
        .add_milestone(app.id, details("mvp", "60.00"))
        .await
        .unwrap();
    engine
        .milestones
        .add_milestone(app.id, details("beta launch", "30.00"))
        .await
        .unwrap();

    let err = engine.milestones.activate_app(app.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::MilestonePercentageSum { .. })
    ));

    // the app is still PENDING, so the plan can be fixed and re-activated
    engine
        .milestones
        .add_milestone(app.id, details("public launch", "10.00"))
        .await
        .unwrap();
    engine
        .milestones
        .activate_app(app.id)
        .await
        .expect("Activation with a complete plan failed");
}

#[tokio::test]
async fn test_cancelled_milestones_leave_the_plan() {
    let engine = engine();
    let app = registered_app(&engine).await;

    engine
        .milestones
        .add_milestone(app.id, details("mvp", "60.00"))
        .await
        .unwrap();
    engine
        .milestones
        .add_milestone(app.id, details("beta launch", "30.00"))
        .await
        .unwrap();
    let scrapped = engine
        .milestones
        .add_milestone(app.id, details("scrapped scope", "10.00"))
        .await
        .unwrap();
    engine
        .milestones
        .cancel_milestone(app.id, scrapped.id)
        .await
        .unwrap();

    // the cancelled 10% no longer counts toward the plan
    let err = engine.milestones.activate_app(app.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::MilestonePercentageSum { .. })
    ));

    engine
        .milestones
        .add_milestone(app.id, details("public launch", "10.00"))
        .await
        .unwrap();
    engine.milestones.activate_app(app.id).await.unwrap();
}

#[tokio::test]
async fn test_plan_frozen_once_active() {
    let engine = engine();
    let app = registered_app(&engine).await;

    let milestone = engine
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

    let err = engine
        .milestones
        .add_milestone(app.id, details("afterthought", "10.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));

    let err = engine
        .milestones
        .edit_milestone(app.id, milestone.id, details("mvp reworked", "60.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));
}

#[tokio::test]
async fn test_progress_gates_verification_request() {
    let engine = engine();
    let app = registered_app(&engine).await;
    let milestone = engine
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

    engine
        .milestones
        .start_milestone(app.id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .update_progress(app.id, milestone.id, 60)
        .await
        .unwrap();

    let err = engine
        .milestones
        .request_verification(app.id, milestone.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));

    engine
        .milestones
        .update_progress(app.id, milestone.id, 100)
        .await
        .unwrap();
    engine
        .milestones
        .request_verification(app.id, milestone.id)
        .await
        .expect("Verification request at 100% failed");
}

#[tokio::test]
async fn test_verification_opens_release_sized_by_share_of_goal() {
    let engine = engine();
    let app = registered_app(&engine).await;
    engine
        .milestones
        .add_milestone(app.id, details("mvp", "60.00"))
        .await
        .unwrap();
    let milestone = engine
        .milestones
        .add_milestone(app.id, details("beta launch", "40.00"))
        .await
        .unwrap();
    engine.milestones.activate_app(app.id).await.unwrap();

    engine
        .milestones
        .start_milestone(app.id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .update_progress(app.id, milestone.id, 100)
        .await
        .unwrap();

    let mut rx = engine.events.subscribe();
    engine
        .milestones
        .request_verification(app.id, milestone.id)
        .await
        .unwrap();
    let reviewer = UserId::new();
    let release = engine
        .milestones
        .verify(app.id, milestone.id, reviewer, Some("demo checked".to_string()))
        .await
        .expect("Verification failed");

    // 40% of the 10000.00 goal
    assert_eq!(release.amount, "4000.00".parse().unwrap());
    assert_eq!(release.status, ReleaseStatus::Pending);
    assert_eq!(release.milestone, milestone.id);

    let mut session = engine.store.lock_app(app.id).await.unwrap();
    let stored = session.find_milestone(milestone.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MilestoneStatus::Verified);
    assert_eq!(stored.verified_by, Some(reviewer));
    drop(session);

    let first = rx.try_recv().unwrap();
    assert!(matches!(
        first,
        EscrowEvent::MilestoneVerificationRequested { .. }
    ));
    match rx.try_recv().unwrap() {
        EscrowEvent::MilestoneVerified { release_id, .. } => {
            assert_eq!(release_id, release.id)
        }
        other => panic!("Expected MilestoneVerified, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_verification_returns_for_rework() {
    let engine = engine();
    let app = registered_app(&engine).await;
    let milestone = engine
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

    engine
        .milestones
        .start_milestone(app.id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .update_progress(app.id, milestone.id, 100)
        .await
        .unwrap();
    engine
        .milestones
        .request_verification(app.id, milestone.id)
        .await
        .unwrap();

    engine
        .milestones
        .reject_verification(
            app.id,
            milestone.id,
            UserId::new(),
            Some("screenshots missing".to_string()),
        )
        .await
        .unwrap();

    let mut session = engine.store.lock_app(app.id).await.unwrap();
    let stored = session.find_milestone(milestone.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MilestoneStatus::InProgress);
    assert!(session.releases().await.unwrap().is_empty());
    drop(session);

    // rework and resubmit
    engine
        .milestones
        .request_verification(app.id, milestone.id)
        .await
        .unwrap();
    let release = engine
        .milestones
        .verify(app.id, milestone.id, UserId::new(), None)
        .await
        .unwrap();
    assert_eq!(release.amount, "6000.00".parse().unwrap());
}

#[tokio::test]
async fn test_milestone_completion_requires_settled_release() {
    let engine = engine();
    let app = registered_app(&engine).await;
    let milestone = engine
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

    engine
        .milestones
        .start_milestone(app.id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .update_progress(app.id, milestone.id, 100)
        .await
        .unwrap();
    engine
        .milestones
        .request_verification(app.id, milestone.id)
        .await
        .unwrap();
    engine
        .milestones
        .verify(app.id, milestone.id, UserId::new(), None)
        .await
        .unwrap();

    // the release is open but no payout has settled yet
    let err = engine
        .milestones
        .mark_completed(app.id, milestone.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateTransition(_)));
}
