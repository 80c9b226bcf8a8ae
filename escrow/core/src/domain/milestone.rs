// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Milestone State Machine
//!
//! PENDING → IN_PROGRESS → VERIFICATION_REQUESTED → {VERIFIED | back to
//! IN_PROGRESS} → COMPLETED, with DELAYED/CANCELLED side states reachable
//! from PENDING/IN_PROGRESS.
//!
//! Verification gates fund release: a VERIFIED milestone sizes its payout as
//! `funding_goal * release_percentage / 100`. Milestone details are frozen
//! once the parent app leaves PENDING (the service enforces that guard, since
//! it owns the app row).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{EngineError, StateTransitionError, ValidationError};
use crate::domain::ids::{AppId, MilestoneId, UserId};
use crate::domain::primitives::{ArithmeticError, Money, Percentage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    VerificationRequested,
    Verified,
    /// Present in the stored status set for compatibility; a rejected
    /// verification transitions back to `InProgress`.
    Rejected,
    Completed,
    Delayed,
    Cancelled,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "PENDING",
            MilestoneStatus::InProgress => "IN_PROGRESS",
            MilestoneStatus::VerificationRequested => "VERIFICATION_REQUESTED",
            MilestoneStatus::Verified => "VERIFIED",
            MilestoneStatus::Rejected => "REJECTED",
            MilestoneStatus::Completed => "COMPLETED",
            MilestoneStatus::Delayed => "DELAYED",
            MilestoneStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(MilestoneStatus::Pending),
            "IN_PROGRESS" => Some(MilestoneStatus::InProgress),
            "VERIFICATION_REQUESTED" => Some(MilestoneStatus::VerificationRequested),
            "VERIFIED" => Some(MilestoneStatus::Verified),
            "REJECTED" => Some(MilestoneStatus::Rejected),
            "COMPLETED" => Some(MilestoneStatus::Completed),
            "DELAYED" => Some(MilestoneStatus::Delayed),
            "CANCELLED" => Some(MilestoneStatus::Cancelled),
            _ => None,
        }
    }
}

/// The editable half of a milestone. Frozen once the app leaves PENDING.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneDetails {
    pub title: String,
    pub description: String,
    pub target_date: NaiveDate,
    pub release_percentage: Percentage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMilestone {
    pub id: MilestoneId,
    pub app: AppId,
    pub title: String,
    pub description: String,
    pub target_date: NaiveDate,
    pub release_percentage: Percentage,
    pub status: MilestoneStatus,
    pub progress: u8,
    pub verification_requested_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub verification_notes: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectMilestone {
    pub fn new(app: AppId, details: MilestoneDetails) -> Result<Self, ValidationError> {
        Self::validate_details(&details)?;
        let now = Utc::now();
        Ok(Self {
            id: MilestoneId::new(),
            app,
            title: details.title,
            description: details.description,
            target_date: details.target_date,
            release_percentage: details.release_percentage,
            status: MilestoneStatus::Pending,
            progress: 0,
            verification_requested_at: None,
            verified_at: None,
            verified_by: None,
            verification_notes: None,
            completion_date: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn validate_details(details: &MilestoneDetails) -> Result<(), ValidationError> {
        if !details.release_percentage.is_positive()
            || details.release_percentage > Percentage::HUNDRED
        {
            return Err(ValidationError::ReleasePercentageOutOfRange {
                value: details.release_percentage,
            });
        }
        Ok(())
    }

    /// Replaces the editable fields. The service rejects this once the app
    /// has left PENDING; the entity only re-validates the values.
    pub fn apply_details(&mut self, details: MilestoneDetails) -> Result<(), ValidationError> {
        Self::validate_details(&details)?;
        self.title = details.title;
        self.description = details.description;
        self.target_date = details.target_date;
        self.release_percentage = details.release_percentage;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), StateTransitionError> {
        if self.status != MilestoneStatus::Pending {
            return Err(self.transition_error("start"));
        }
        self.status = MilestoneStatus::InProgress;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_progress(&mut self, progress: u8) -> Result<(), EngineError> {
        if self.status != MilestoneStatus::InProgress {
            return Err(self.transition_error("update progress").into());
        }
        if progress > 100 {
            return Err(ValidationError::ProgressOutOfRange { progress }.into());
        }
        self.progress = progress;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Valid only from IN_PROGRESS at 100% progress.
    pub fn request_verification(&mut self) -> Result<(), StateTransitionError> {
        if self.status != MilestoneStatus::InProgress {
            return Err(self.transition_error("request verification"));
        }
        if self.progress != 100 {
            return Err(StateTransitionError::new(
                "ProjectMilestone",
                self.id.0,
                "request verification",
                format!("IN_PROGRESS at {}% progress", self.progress),
            ));
        }
        self.status = MilestoneStatus::VerificationRequested;
        self.verification_requested_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn verify(&mut self, reviewer: UserId, notes: Option<String>) -> Result<(), StateTransitionError> {
        if self.status != MilestoneStatus::VerificationRequested {
            return Err(self.transition_error("verify"));
        }
        self.status = MilestoneStatus::Verified;
        self.verified_at = Some(Utc::now());
        self.verified_by = Some(reviewer);
        self.verification_notes = notes;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns the milestone to IN_PROGRESS for rework.
    pub fn reject(&mut self, _reviewer: UserId, notes: Option<String>) -> Result<(), StateTransitionError> {
        if self.status != MilestoneStatus::VerificationRequested {
            return Err(self.transition_error("reject"));
        }
        self.status = MilestoneStatus::InProgress;
        self.verification_requested_at = None;
        self.verification_notes = notes;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Finalizes a VERIFIED milestone after its release has settled. The
    /// service checks the release; the escrow debit happened there.
    pub fn mark_completed(&mut self) -> Result<(), StateTransitionError> {
        if self.status != MilestoneStatus::Verified {
            return Err(self.transition_error("mark completed"));
        }
        self.status = MilestoneStatus::Completed;
        self.progress = 100;
        self.completion_date = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn delay(&mut self) -> Result<(), StateTransitionError> {
        if !matches!(self.status, MilestoneStatus::Pending | MilestoneStatus::InProgress) {
            return Err(self.transition_error("delay"));
        }
        self.status = MilestoneStatus::Delayed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), StateTransitionError> {
        if self.status != MilestoneStatus::Delayed {
            return Err(self.transition_error("resume"));
        }
        self.status = MilestoneStatus::InProgress;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), StateTransitionError> {
        if !matches!(
            self.status,
            MilestoneStatus::Pending | MilestoneStatus::InProgress | MilestoneStatus::Delayed
        ) {
            return Err(self.transition_error("cancel"));
        }
        self.status = MilestoneStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `funding_goal * release_percentage / 100`: the payout this milestone
    /// unlocks.
    pub fn release_amount(&self, funding_goal: Money) -> Result<Money, ArithmeticError> {
        funding_goal.percent_of(self.release_percentage)
    }

    fn transition_error(&self, operation: &'static str) -> StateTransitionError {
        StateTransitionError::new("ProjectMilestone", self.id.0, operation, self.status.as_str())
    }
}
