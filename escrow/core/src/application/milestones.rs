// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Milestone Lifecycle Use Cases
//!
//! Application service for the milestone plan: authoring while the app is
//! still PENDING, activation, progress tracking, and the verification step
//! that creates the pending Release.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Milestone state machine plus the verify → Release
//!   handoff
//! - **Collaborators:**
//!   - Domain: ProjectMilestone, Release, App
//!   - Infrastructure: LedgerStore, EscrowEventBus
//!
//! Verification creates the Release; it performs no escrow debit. The
//! workflow service settles the payout and `mark_completed` only finalizes
//! milestone state afterwards.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::app::AppStatus;
use crate::domain::error::{EngineError, StateTransitionError};
use crate::domain::events::EscrowEvent;
use crate::domain::ids::{AppId, MilestoneId, UserId};
use crate::domain::milestone::{MilestoneDetails, MilestoneStatus, ProjectMilestone};
use crate::domain::release::{Release, ReleaseStatus};
use crate::domain::store::{AppSession, LedgerStore};
use crate::infrastructure::event_bus::EscrowEventBus;

pub struct MilestoneService {
    store: Arc<dyn LedgerStore>,
    events: Arc<EscrowEventBus>,
}

impl MilestoneService {
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<EscrowEventBus>) -> Self {
        Self { store, events }
    }

    /// Adds a milestone to the plan. Only possible while the app is still
    /// PENDING; the plan freezes at activation.
    pub async fn add_milestone(
        &self,
        app_id: AppId,
        details: MilestoneDetails,
    ) -> Result<ProjectMilestone, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        guard_plan_editable(session.as_ref())?;

        let milestone = ProjectMilestone::new(app_id, details)?;
        session.insert_milestone(&milestone).await?;
        session.commit().await?;

        info!(app_id = %app_id, milestone_id = %milestone.id, "Milestone added");
        Ok(milestone)
    }

    /// Replaces a milestone's editable fields, PENDING apps only.
    pub async fn edit_milestone(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
        details: MilestoneDetails,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        guard_plan_editable(session.as_ref())?;

        let mut milestone = find_milestone(session.as_mut(), milestone_id).await?;
        milestone.apply_details(details)?;
        session.update_milestone(&milestone).await?;
        session.commit().await?;
        Ok(())
    }

    /// Validates the milestone plan (two or more milestones, release
    /// percentages summing to exactly 100%) and opens the app for
    /// investment.
    pub async fn activate_app(&self, app_id: AppId) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;

        let milestones: Vec<ProjectMilestone> = session
            .milestones()
            .await?
            .into_iter()
            .filter(|m| m.status != MilestoneStatus::Cancelled)
            .collect();
        session.app_mut().activate(&milestones)?;
        session.commit().await?;

        info!(app_id = %app_id, milestones = milestones.len(), "App activated");
        Ok(())
    }

    pub async fn start_milestone(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<(), EngineError> {
        self.transition(app_id, milestone_id, |m| m.start().map_err(Into::into))
            .await
    }

    pub async fn update_progress(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
        progress: u8,
    ) -> Result<(), EngineError> {
        self.transition(app_id, milestone_id, |m| m.update_progress(progress))
            .await
    }

    /// Developer asks for review of a finished milestone.
    pub async fn request_verification(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut milestone = find_milestone(session.as_mut(), milestone_id).await?;

        milestone.request_verification()?;
        session.update_milestone(&milestone).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::MilestoneVerificationRequested {
            app_id,
            milestone_id,
            requested_at: Utc::now(),
        });
        info!(app_id = %app_id, milestone_id = %milestone_id, "Milestone verification requested");
        Ok(())
    }

    /// Reviewer accepts the milestone and a pending Release is created for
    /// its share of the funding goal. At most one open release may exist
    /// per milestone.
    pub async fn verify(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
        reviewer: UserId,
        notes: Option<String>,
    ) -> Result<Release, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut milestone = find_milestone(session.as_mut(), milestone_id).await?;

        // Step 1: One open release per milestone
        if let Some(open) = session
            .releases()
            .await?
            .into_iter()
            .find(|r| r.milestone == milestone_id && !r.status.is_terminal())
        {
            return Err(StateTransitionError::new(
                "Release",
                open.id.0,
                "create",
                format!("{} release already open for this milestone", open.status.as_str()),
            )
            .into());
        }

        // Step 2: Transition the milestone and size the payout
        milestone.verify(reviewer, notes)?;
        let amount = milestone.release_amount(session.app().funding_goal)?;
        let release = Release::new(app_id, milestone_id, amount);

        session.update_milestone(&milestone).await?;
        session.insert_release(&release).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::MilestoneVerified {
            app_id,
            milestone_id,
            release_id: release.id,
            verified_by: reviewer,
            verified_at: Utc::now(),
        });
        info!(
            app_id = %app_id,
            milestone_id = %milestone_id,
            release_id = %release.id,
            amount = %amount,
            "Milestone verified, release opened"
        );
        Ok(release)
    }

    /// Reviewer sends the milestone back for rework.
    pub async fn reject_verification(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
        reviewer: UserId,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut milestone = find_milestone(session.as_mut(), milestone_id).await?;

        milestone.reject(reviewer, notes.clone())?;
        session.update_milestone(&milestone).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::MilestoneRejected {
            app_id,
            milestone_id,
            rejected_by: reviewer,
            notes,
            rejected_at: Utc::now(),
        });
        info!(app_id = %app_id, milestone_id = %milestone_id, "Milestone verification rejected");
        Ok(())
    }

    /// Finalizes a VERIFIED milestone once its release has settled. When the
    /// last milestone of a FUNDED app completes, the round completes too.
    pub async fn mark_completed(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut milestone = find_milestone(session.as_mut(), milestone_id).await?;

        let settled = session
            .releases()
            .await?
            .iter()
            .any(|r| r.milestone == milestone_id && r.status == ReleaseStatus::Completed);
        if !settled {
            return Err(StateTransitionError::new(
                "ProjectMilestone",
                milestone_id.0,
                "mark completed",
                "VERIFIED without a settled release".to_string(),
            )
            .into());
        }

        milestone.mark_completed()?;
        session.update_milestone(&milestone).await?;

        let all_done = session
            .milestones()
            .await?
            .iter()
            .all(|m| {
                m.id == milestone_id
                    || matches!(
                        m.status,
                        MilestoneStatus::Completed | MilestoneStatus::Cancelled
                    )
            });
        if all_done && session.app().status == AppStatus::Funded {
            session.app_mut().complete()?;
        }

        session.commit().await?;
        info!(app_id = %app_id, milestone_id = %milestone_id, "Milestone completed");
        Ok(())
    }

    pub async fn delay_milestone(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<(), EngineError> {
        self.transition(app_id, milestone_id, |m| m.delay().map_err(Into::into))
            .await
    }

    pub async fn resume_milestone(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<(), EngineError> {
        self.transition(app_id, milestone_id, |m| m.resume().map_err(Into::into))
            .await
    }

    pub async fn cancel_milestone(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<(), EngineError> {
        self.transition(app_id, milestone_id, |m| m.cancel().map_err(Into::into))
            .await
    }

    /// Locked find-transition-update-commit cycle shared by the simple
    /// transitions.
    async fn transition<F>(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
        apply: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&mut ProjectMilestone) -> Result<(), EngineError>,
    {
        let mut session = self.store.lock_app(app_id).await?;
        let mut milestone = find_milestone(session.as_mut(), milestone_id).await?;
        apply(&mut milestone)?;
        session.update_milestone(&milestone).await?;
        session.commit().await?;
        Ok(())
    }
}

fn guard_plan_editable(session: &dyn AppSession) -> Result<(), EngineError> {
    let app = session.app();
    if app.status != AppStatus::Pending {
        return Err(StateTransitionError::new(
            "App",
            app.id.0,
            "edit milestone plan",
            app.status.as_str(),
        )
        .into());
    }
    Ok(())
}

async fn find_milestone(
    session: &mut dyn AppSession,
    milestone_id: MilestoneId,
) -> Result<ProjectMilestone, EngineError> {
    session
        .find_milestone(milestone_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "ProjectMilestone",
            id: milestone_id.0,
        })
}
