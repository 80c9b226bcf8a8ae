// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::escrow::DisputeOutcome;
use crate::domain::ids::{
    AppId, DisputeId, InvestmentId, MilestoneId, ReleaseId, TransactionId, TransferId, UserId,
};
use crate::domain::primitives::{Money, Percentage};

/// Ledger lifecycle events, published after the owning transaction commits.
///
/// Every event carries the id of the app whose ledger it belongs to, so
/// subscribers can filter to a single funding round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EscrowEvent {
    InvestmentAllocated {
        app_id: AppId,
        investment_id: InvestmentId,
        investor: UserId,
        amount: Money,
        percentage_bought: Percentage,
        allocated_at: DateTime<Utc>,
    },
    InvestmentRefunded {
        app_id: AppId,
        investment_id: InvestmentId,
        investor: UserId,
        amount: Money,
        refunded_at: DateTime<Utc>,
    },
    AppFullyFunded {
        app_id: AppId,
        total_invested: Money,
        funded_at: DateTime<Utc>,
    },
    MilestoneVerificationRequested {
        app_id: AppId,
        milestone_id: MilestoneId,
        requested_at: DateTime<Utc>,
    },
    MilestoneVerified {
        app_id: AppId,
        milestone_id: MilestoneId,
        release_id: ReleaseId,
        verified_by: UserId,
        verified_at: DateTime<Utc>,
    },
    MilestoneRejected {
        app_id: AppId,
        milestone_id: MilestoneId,
        rejected_by: UserId,
        notes: Option<String>,
        rejected_at: DateTime<Utc>,
    },
    ReleaseApproved {
        app_id: AppId,
        release_id: ReleaseId,
        milestone_id: MilestoneId,
        approved_by: UserId,
        approved_at: DateTime<Utc>,
    },
    ReleaseRejected {
        app_id: AppId,
        release_id: ReleaseId,
        rejected_by: UserId,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
    ReleaseCompleted {
        app_id: AppId,
        release_id: ReleaseId,
        milestone_id: MilestoneId,
        amount: Money,
        gateway_reference: Option<String>,
        completed_at: DateTime<Utc>,
    },
    ReleaseFailed {
        app_id: AppId,
        release_id: ReleaseId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    ReleaseRolledBack {
        app_id: AppId,
        release_id: ReleaseId,
        amount: Money,
        rolled_back_at: DateTime<Utc>,
    },
    DisputeOpened {
        app_id: AppId,
        dispute_id: DisputeId,
        transaction_id: TransactionId,
        raised_by: UserId,
        opened_at: DateTime<Utc>,
    },
    DisputeResolved {
        app_id: AppId,
        dispute_id: DisputeId,
        transaction_id: TransactionId,
        outcome: DisputeOutcome,
        resolved_by: UserId,
        resolved_at: DateTime<Utc>,
    },
    SharesTransferred {
        app_id: AppId,
        transfer_id: TransferId,
        seller: UserId,
        buyer: UserId,
        percentage_amount: Percentage,
        transferred_at: DateTime<Utc>,
    },
}

impl EscrowEvent {
    /// The app whose ledger this event belongs to.
    pub fn app_id(&self) -> AppId {
        match self {
            EscrowEvent::InvestmentAllocated { app_id, .. }
            | EscrowEvent::InvestmentRefunded { app_id, .. }
            | EscrowEvent::AppFullyFunded { app_id, .. }
            | EscrowEvent::MilestoneVerificationRequested { app_id, .. }
            | EscrowEvent::MilestoneVerified { app_id, .. }
            | EscrowEvent::MilestoneRejected { app_id, .. }
            | EscrowEvent::ReleaseApproved { app_id, .. }
            | EscrowEvent::ReleaseRejected { app_id, .. }
            | EscrowEvent::ReleaseCompleted { app_id, .. }
            | EscrowEvent::ReleaseFailed { app_id, .. }
            | EscrowEvent::ReleaseRolledBack { app_id, .. }
            | EscrowEvent::DisputeOpened { app_id, .. }
            | EscrowEvent::DisputeResolved { app_id, .. }
            | EscrowEvent::SharesTransferred { app_id, .. } => *app_id,
        }
    }
}
