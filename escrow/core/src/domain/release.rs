// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Release Workflow
//!
//! A [`Release`] is the approval workflow wrapped around one milestone
//! payout. Verifying a milestone creates it in `PENDING`; an approver moves
//! it through `APPROVED` and `PROCESSING` to a terminal `COMPLETED`, or to
//! `FAILED` from which a retry may re-enter `PROCESSING`.
//!
//! # Architecture
//!
//! - **Layer:** Domain (entity)
//! - The workflow never touches the ledger itself; the escrow debit and the
//!   gateway transfer happen in the application service, which drives these
//!   transitions under the app lock.
//! - `request_approval` is a one-shot step: it may happen at most once per
//!   release, and an admin can only `approve` after a request was recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::StateTransitionError;
use crate::domain::ids::{AppId, MilestoneId, ReleaseId, UserId};
use crate::domain::primitives::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
    Completed,
    Failed,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Pending => "PENDING",
            ReleaseStatus::Approved => "APPROVED",
            ReleaseStatus::Rejected => "REJECTED",
            ReleaseStatus::Processing => "PROCESSING",
            ReleaseStatus::Completed => "COMPLETED",
            ReleaseStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReleaseStatus::Pending),
            "APPROVED" => Some(ReleaseStatus::Approved),
            "REJECTED" => Some(ReleaseStatus::Rejected),
            "PROCESSING" => Some(ReleaseStatus::Processing),
            "COMPLETED" => Some(ReleaseStatus::Completed),
            "FAILED" => Some(ReleaseStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReleaseStatus::Completed | ReleaseStatus::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub app: AppId,
    pub milestone: MilestoneId,
    pub amount: Money,
    pub status: ReleaseStatus,
    pub approval_requested_at: Option<DateTime<Utc>>,
    pub approval_requested_by: Option<UserId>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub transaction_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Release {
    pub fn new(app: AppId, milestone: MilestoneId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: ReleaseId::new(),
            app,
            milestone,
            amount,
            status: ReleaseStatus::Pending,
            approval_requested_at: None,
            approval_requested_by: None,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            transaction_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
            completed_at: None,
        }
    }

    pub fn can_request_approval(&self) -> bool {
        self.status == ReleaseStatus::Pending && self.approval_requested_at.is_none()
    }

    /// Records the one approval-request notification. Repeat requests and
    /// requests on a decided release are rejected.
    pub fn request_approval(&mut self, by: UserId) -> Result<(), StateTransitionError> {
        if !self.can_request_approval() {
            let state = if self.approval_requested_at.is_some() {
                format!("{} with approval already requested", self.status.as_str())
            } else {
                self.status.as_str().to_string()
            };
            return Err(StateTransitionError::new(
                "Release",
                self.id.0,
                "request approval",
                state,
            ));
        }
        let now = Utc::now();
        self.approval_requested_at = Some(now);
        self.approval_requested_by = Some(by);
        self.updated_at = now;
        Ok(())
    }

    /// Approval requires a recorded approval request and a still-pending
    /// release.
    pub fn approve(
        &mut self,
        by: UserId,
        notes: Option<String>,
    ) -> Result<(), StateTransitionError> {
        if self.status != ReleaseStatus::Pending {
            return Err(self.transition_error("approve"));
        }
        if self.approval_requested_at.is_none() {
            return Err(StateTransitionError::new(
                "Release",
                self.id.0,
                "approve",
                "PENDING without an approval request".to_string(),
            ));
        }
        let now = Utc::now();
        self.status = ReleaseStatus::Approved;
        self.approved_by = Some(by);
        self.approved_at = Some(now);
        self.approval_notes = notes;
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, by: UserId, reason: String) -> Result<(), StateTransitionError> {
        if self.status != ReleaseStatus::Pending {
            return Err(self.transition_error("reject"));
        }
        let now = Utc::now();
        self.status = ReleaseStatus::Rejected;
        self.rejected_by = Some(by);
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// Claims the release for payout processing.
    pub fn mark_processing(&mut self) -> Result<(), StateTransitionError> {
        if self.status != ReleaseStatus::Approved {
            return Err(self.transition_error("process"));
        }
        let now = Utc::now();
        self.status = ReleaseStatus::Processing;
        self.processed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, reference: Option<String>) -> Result<(), StateTransitionError> {
        if self.status != ReleaseStatus::Processing {
            return Err(self.transition_error("complete"));
        }
        let now = Utc::now();
        self.status = ReleaseStatus::Completed;
        self.transaction_reference = reference;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Fails a payout attempt. Valid while processing, or still approved
    /// when the attempt died before claiming the release.
    pub fn fail(&mut self, reason: String) -> Result<(), StateTransitionError> {
        if !matches!(
            self.status,
            ReleaseStatus::Processing | ReleaseStatus::Approved
        ) {
            return Err(self.transition_error("fail"));
        }
        self.status = ReleaseStatus::Failed;
        self.failure_reason = Some(reason);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-enters processing after a failed payout attempt.
    pub fn begin_retry(&mut self) -> Result<(), StateTransitionError> {
        if self.status != ReleaseStatus::Failed {
            return Err(self.transition_error("retry"));
        }
        self.status = ReleaseStatus::Processing;
        self.failure_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Reverses a completed release after its payout was compensated. The
    /// gateway reference is kept as the audit trail of the original transfer.
    pub fn mark_rolled_back(&mut self, reason: String) -> Result<(), StateTransitionError> {
        if self.status != ReleaseStatus::Completed {
            return Err(self.transition_error("roll back"));
        }
        self.status = ReleaseStatus::Failed;
        self.failure_reason = Some(reason);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition_error(&self, operation: &'static str) -> StateTransitionError {
        StateTransitionError::new(
            "Release",
            self.id.0,
            operation,
            self.status.as_str().to_string(),
        )
    }
}
