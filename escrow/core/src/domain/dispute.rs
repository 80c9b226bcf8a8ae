// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispute cases raised against escrow deposits.
//!
//! A [`Dispute`] is the case-management record wrapped around one frozen
//! ledger entry. Opening a case freezes the entry; resolving it decides
//! where the frozen cash goes. Assignment and escalation track who is
//! working the case and never move money.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::StateTransitionError;
use crate::domain::escrow::DisputeOutcome;
use crate::domain::ids::{AppId, DisputeId, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeCaseStatus {
    Pending,
    InReview,
    Escalated,
    Resolved,
    Closed,
}

impl DisputeCaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeCaseStatus::Pending => "PENDING",
            DisputeCaseStatus::InReview => "IN_REVIEW",
            DisputeCaseStatus::Escalated => "ESCALATED",
            DisputeCaseStatus::Resolved => "RESOLVED",
            DisputeCaseStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(DisputeCaseStatus::Pending),
            "IN_REVIEW" => Some(DisputeCaseStatus::InReview),
            "ESCALATED" => Some(DisputeCaseStatus::Escalated),
            "RESOLVED" => Some(DisputeCaseStatus::Resolved),
            "CLOSED" => Some(DisputeCaseStatus::Closed),
            _ => None,
        }
    }

    /// A case still waiting on a decision.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            DisputeCaseStatus::Pending | DisputeCaseStatus::InReview | DisputeCaseStatus::Escalated
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub app: AppId,
    pub transaction: TransactionId,
    pub raised_by: UserId,
    pub reason: String,
    pub status: DisputeCaseStatus,
    pub assigned_to: Option<UserId>,
    pub escalation_note: Option<String>,
    pub resolution: Option<DisputeOutcome>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(app: AppId, transaction: TransactionId, raised_by: UserId, reason: String) -> Self {
        let now = Utc::now();
        Self {
            id: DisputeId::new(),
            app,
            transaction,
            raised_by,
            reason,
            status: DisputeCaseStatus::Pending,
            assigned_to: None,
            escalation_note: None,
            resolution: None,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn assign(&mut self, reviewer: UserId) -> Result<(), StateTransitionError> {
        if !matches!(
            self.status,
            DisputeCaseStatus::Pending | DisputeCaseStatus::Escalated
        ) {
            return Err(self.transition_error("assign"));
        }
        self.status = DisputeCaseStatus::InReview;
        self.assigned_to = Some(reviewer);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn escalate(&mut self, note: Option<String>) -> Result<(), StateTransitionError> {
        if !matches!(
            self.status,
            DisputeCaseStatus::Pending | DisputeCaseStatus::InReview
        ) {
            return Err(self.transition_error("escalate"));
        }
        self.status = DisputeCaseStatus::Escalated;
        self.escalation_note = note;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the decision. The caller settles the frozen ledger entry in
    /// the same transaction.
    pub fn resolve(
        &mut self,
        resolver: UserId,
        outcome: DisputeOutcome,
        notes: Option<String>,
    ) -> Result<(), StateTransitionError> {
        if !self.status.is_open() {
            return Err(self.transition_error("resolve"));
        }
        let now = Utc::now();
        self.status = DisputeCaseStatus::Resolved;
        self.resolution = Some(outcome);
        self.resolution_notes = notes;
        self.resolved_by = Some(resolver);
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), StateTransitionError> {
        if self.status != DisputeCaseStatus::Resolved {
            return Err(self.transition_error("close"));
        }
        let now = Utc::now();
        self.status = DisputeCaseStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn transition_error(&self, operation: &'static str) -> StateTransitionError {
        StateTransitionError::new(
            "Dispute",
            self.id.0,
            operation,
            self.status.as_str().to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispute() -> Dispute {
        Dispute::new(
            AppId::new(),
            TransactionId::new(),
            UserId::new(),
            "unauthorized charge".to_string(),
        )
    }

    #[test]
    fn test_assign_review_resolve_close() {
        let mut d = dispute();
        let reviewer = UserId::new();

        d.assign(reviewer).unwrap();
        assert_eq!(d.status, DisputeCaseStatus::InReview);
        assert_eq!(d.assigned_to, Some(reviewer));

        d.resolve(reviewer, DisputeOutcome::ResolvedRefund, Some("valid claim".to_string()))
            .unwrap();
        assert_eq!(d.resolution, Some(DisputeOutcome::ResolvedRefund));

        d.close().unwrap();
        assert_eq!(d.status, DisputeCaseStatus::Closed);
        assert!(d.closed_at.is_some());
    }

    #[test]
    fn test_escalated_case_can_be_reassigned() {
        let mut d = dispute();
        d.escalate(Some("needs compliance review".to_string())).unwrap();
        assert_eq!(d.status, DisputeCaseStatus::Escalated);

        d.assign(UserId::new()).unwrap();
        assert_eq!(d.status, DisputeCaseStatus::InReview);
    }

    #[test]
    fn test_resolution_is_final() {
        let mut d = dispute();
        d.resolve(UserId::new(), DisputeOutcome::ResolvedRelease, None)
            .unwrap();

        assert!(d.assign(UserId::new()).is_err());
        assert!(d.escalate(None).is_err());
        assert!(d
            .resolve(UserId::new(), DisputeOutcome::ResolvedRefund, None)
            .is_err());
    }

    #[test]
    fn test_close_requires_resolution() {
        let mut d = dispute();
        assert!(d.close().is_err());
    }
}
