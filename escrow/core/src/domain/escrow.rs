// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Escrow Ledger Entries
//!
//! [`EscrowTransaction`] is one row of an app's append-only ledger. Entries
//! are never deleted and their amounts never change; corrections are new
//! compensating entries linked through `original_transaction`.
//!
//! # Architecture
//!
//! - **Balances are folds.** [`EscrowTotals::from_entries`] derives both the
//!   *physical* balance (the cash the platform holds, backing
//!   `App::funds_in_escrow`) and the *available* balance (physical minus
//!   unresolved dispute holds, consulted by release checks). Services
//!   evaluate the fold inside the app lock, never from a stale read.
//! - **Dispute freeze.** Freezing rewrites a deposit to
//!   `DISPUTE_HOLD`/`DISPUTED`: the cash stays physical but leaves the
//!   available balance until resolution appends the settling entry.
//! - **Idempotency anchor.** A settled `MILESTONE_RELEASE` entry keyed by
//!   its release id marks the payout as already debited; a retry that finds
//!   an unreversed anchor must not debit again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{InvariantViolation, StateTransitionError};
use crate::domain::ids::{AppId, InvestmentId, MilestoneId, ReleaseId, TransactionId, UserId};
use crate::domain::primitives::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Release,
    Refund,
    PartialRefund,
    MilestoneRelease,
    DisputeHold,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Release => "RELEASE",
            TransactionKind::Refund => "REFUND",
            TransactionKind::PartialRefund => "PARTIAL_REFUND",
            TransactionKind::MilestoneRelease => "MILESTONE_RELEASE",
            TransactionKind::DisputeHold => "DISPUTE_HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPOSIT" => Some(TransactionKind::Deposit),
            "RELEASE" => Some(TransactionKind::Release),
            "REFUND" => Some(TransactionKind::Refund),
            "PARTIAL_REFUND" => Some(TransactionKind::PartialRefund),
            "MILESTONE_RELEASE" => Some(TransactionKind::MilestoneRelease),
            "DISPUTE_HOLD" => Some(TransactionKind::DisputeHold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
    Disputed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Refunded => "REFUNDED",
            TransactionStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            TransactionStatus::Disputed => "DISPUTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            "REFUNDED" => Some(TransactionStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(TransactionStatus::PartiallyRefunded),
            "DISPUTED" => Some(TransactionStatus::Disputed),
            _ => None,
        }
    }
}

/// Dispute position of a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    NoDispute,
    Pending,
    ResolvedRelease,
    ResolvedRefund,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::NoDispute => "NO_DISPUTE",
            DisputeStatus::Pending => "PENDING",
            DisputeStatus::ResolvedRelease => "RESOLVED_RELEASE",
            DisputeStatus::ResolvedRefund => "RESOLVED_REFUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NO_DISPUTE" => Some(DisputeStatus::NoDispute),
            "PENDING" => Some(DisputeStatus::Pending),
            "RESOLVED_RELEASE" => Some(DisputeStatus::ResolvedRelease),
            "RESOLVED_REFUND" => Some(DisputeStatus::ResolvedRefund),
            _ => None,
        }
    }
}

/// Outcome chosen by the dispute resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeOutcome {
    ResolvedRelease,
    ResolvedRefund,
}

impl DisputeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeOutcome::ResolvedRelease => "RESOLVED_RELEASE",
            DisputeOutcome::ResolvedRefund => "RESOLVED_REFUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RESOLVED_RELEASE" => Some(DisputeOutcome::ResolvedRelease),
            "RESOLVED_REFUND" => Some(DisputeOutcome::ResolvedRefund),
            _ => None,
        }
    }
}

impl From<DisputeOutcome> for DisputeStatus {
    fn from(outcome: DisputeOutcome) -> Self {
        match outcome {
            DisputeOutcome::ResolvedRelease => DisputeStatus::ResolvedRelease,
            DisputeOutcome::ResolvedRefund => DisputeStatus::ResolvedRefund,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub id: TransactionId,
    pub app: AppId,
    pub investor: UserId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub status: TransactionStatus,
    pub dispute_status: DisputeStatus,
    pub milestone: Option<MilestoneId>,
    pub release: Option<ReleaseId>,
    pub investment: Option<InvestmentId>,
    pub original_transaction: Option<TransactionId>,
    pub gateway_reference: Option<String>,
    pub dispute_reason: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EscrowTransaction {
    fn base(app: AppId, investor: UserId, kind: TransactionKind, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            app,
            investor,
            kind,
            amount,
            status: TransactionStatus::Completed,
            dispute_status: DisputeStatus::NoDispute,
            milestone: None,
            release: None,
            investment: None,
            original_transaction: None,
            gateway_reference: None,
            dispute_reason: None,
            resolution_notes: None,
            resolved_by: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    /// A settled investor deposit into escrow.
    pub fn deposit(
        app: AppId,
        investor: UserId,
        amount: Money,
        investment: Option<InvestmentId>,
    ) -> Self {
        let mut entry = Self::base(app, investor, TransactionKind::Deposit, amount);
        entry.investment = investment;
        entry
    }

    /// A settled milestone payout to the developer, anchored to its release.
    pub fn milestone_release(
        app: AppId,
        recipient: UserId,
        amount: Money,
        milestone: MilestoneId,
        release: ReleaseId,
        gateway_reference: Option<String>,
    ) -> Self {
        let mut entry = Self::base(app, recipient, TransactionKind::MilestoneRelease, amount);
        entry.milestone = Some(milestone);
        entry.release = Some(release);
        entry.gateway_reference = gateway_reference;
        entry
    }

    /// A settled manual release outside the workflow path. Carries the
    /// milestone link when one applies but never a release anchor.
    pub fn release_entry(
        app: AppId,
        recipient: UserId,
        amount: Money,
        milestone: Option<MilestoneId>,
    ) -> Self {
        let kind = if milestone.is_some() {
            TransactionKind::MilestoneRelease
        } else {
            TransactionKind::Release
        };
        let mut entry = Self::base(app, recipient, kind, amount);
        entry.milestone = milestone;
        entry
    }

    /// The settling entry of a dispute resolved in the developer's favor.
    pub fn dispute_release(
        app: AppId,
        investor: UserId,
        amount: Money,
        original: TransactionId,
    ) -> Self {
        let mut entry = Self::base(app, investor, TransactionKind::Release, amount);
        entry.original_transaction = Some(original);
        entry
    }

    /// A refund back to the investor, full or partial, linked to the entry
    /// it compensates.
    pub fn refund(
        app: AppId,
        investor: UserId,
        amount: Money,
        original: TransactionId,
        partial: bool,
    ) -> Self {
        let kind = if partial {
            TransactionKind::PartialRefund
        } else {
            TransactionKind::Refund
        };
        let mut entry = Self::base(app, investor, kind, amount);
        entry.original_transaction = Some(original);
        entry
    }

    pub fn is_settled(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    /// Freezes a deposit under dispute. The cash stays in escrow but leaves
    /// the available balance until the dispute is resolved.
    pub fn hold_for_dispute(&mut self, reason: String) -> Result<(), StateTransitionError> {
        if self.kind != TransactionKind::Deposit {
            return Err(self.transition_error("hold for dispute"));
        }
        if !matches!(
            self.status,
            TransactionStatus::Pending | TransactionStatus::Completed
        ) || self.dispute_status != DisputeStatus::NoDispute
        {
            return Err(self.transition_error("hold for dispute"));
        }
        self.kind = TransactionKind::DisputeHold;
        self.status = TransactionStatus::Disputed;
        self.dispute_status = DisputeStatus::Pending;
        self.dispute_reason = Some(reason);
        Ok(())
    }

    /// Records the resolver's decision on a frozen entry. The caller appends
    /// the settling RELEASE/REFUND entry in the same transaction.
    pub fn resolve_dispute(
        &mut self,
        resolver: UserId,
        outcome: DisputeOutcome,
        notes: Option<String>,
    ) -> Result<(), StateTransitionError> {
        if self.status != TransactionStatus::Disputed
            || self.dispute_status != DisputeStatus::Pending
        {
            return Err(self.transition_error("resolve dispute"));
        }
        self.dispute_status = outcome.into();
        self.resolved_by = Some(resolver);
        self.resolution_notes = notes;
        Ok(())
    }

    /// Marks a settled deposit as refunded after a compensating entry was
    /// appended.
    pub fn mark_refunded(&mut self, partial: bool) -> Result<(), StateTransitionError> {
        if self.kind != TransactionKind::Deposit
            || !matches!(
                self.status,
                TransactionStatus::Completed | TransactionStatus::PartiallyRefunded
            )
        {
            return Err(self.transition_error("mark refunded"));
        }
        self.status = if partial {
            TransactionStatus::PartiallyRefunded
        } else {
            TransactionStatus::Refunded
        };
        Ok(())
    }

    fn transition_error(&self, operation: &'static str) -> StateTransitionError {
        StateTransitionError::new(
            "EscrowTransaction",
            self.id.0,
            operation,
            format!(
                "{} ({}, {})",
                self.kind.as_str(),
                self.status.as_str(),
                self.dispute_status.as_str()
            ),
        )
    }
}

/// Aggregated balances of one app's ledger.
///
/// Cash-in: settled deposits (including those later marked refunded, whose
/// outflow shows up as the compensating entry) and frozen dispute holds.
/// Cash-out: settled releases and refunds. A refund that reverses a payout
/// counts back in instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscrowTotals {
    pub deposited: Money,
    pub released: Money,
    pub refunded: Money,
    pub reversed: Money,
    pub frozen: Money,
}

impl EscrowTotals {
    pub fn from_entries(entries: &[EscrowTransaction]) -> Self {
        let kinds: HashMap<TransactionId, TransactionKind> =
            entries.iter().map(|e| (e.id, e.kind)).collect();

        let mut totals = EscrowTotals {
            deposited: Money::ZERO,
            released: Money::ZERO,
            refunded: Money::ZERO,
            reversed: Money::ZERO,
            frozen: Money::ZERO,
        };

        for entry in entries {
            match entry.kind {
                TransactionKind::Deposit => {
                    if matches!(
                        entry.status,
                        TransactionStatus::Completed
                            | TransactionStatus::Refunded
                            | TransactionStatus::PartiallyRefunded
                    ) {
                        totals.deposited = totals.deposited.saturating_add(entry.amount);
                    }
                }
                TransactionKind::DisputeHold => {
                    totals.deposited = totals.deposited.saturating_add(entry.amount);
                    if entry.dispute_status == DisputeStatus::Pending {
                        totals.frozen = totals.frozen.saturating_add(entry.amount);
                    }
                }
                TransactionKind::Release | TransactionKind::MilestoneRelease => {
                    if entry.status == TransactionStatus::Completed {
                        totals.released = totals.released.saturating_add(entry.amount);
                    }
                }
                TransactionKind::Refund | TransactionKind::PartialRefund => {
                    if entry.status == TransactionStatus::Completed {
                        let reverses_payout = entry
                            .original_transaction
                            .and_then(|id| kinds.get(&id))
                            .map(|kind| {
                                matches!(
                                    kind,
                                    TransactionKind::Release | TransactionKind::MilestoneRelease
                                )
                            })
                            .unwrap_or(false);
                        if reverses_payout {
                            totals.reversed = totals.reversed.saturating_add(entry.amount);
                        } else {
                            totals.refunded = totals.refunded.saturating_add(entry.amount);
                        }
                    }
                }
            }
        }

        totals
    }

    /// Cash the platform currently holds for the app. Backs
    /// `App::funds_in_escrow`.
    pub fn physical(&self) -> Money {
        self.deposited
            .saturating_sub(self.released)
            .saturating_sub(self.refunded)
            .saturating_add(self.reversed)
    }

    /// Cash a release may draw on: physical minus unresolved dispute holds.
    pub fn available(&self) -> Money {
        self.physical().saturating_sub(self.frozen)
    }

    pub fn in_dispute(&self) -> Money {
        self.frozen
    }
}

/// Operator-facing report over one app's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowSummary {
    pub total_deposits: Money,
    pub total_releases: Money,
    pub total_refunds: Money,
    pub funds_in_dispute: Money,
    pub physical_balance: Money,
    pub available_balance: Money,
}

impl From<EscrowTotals> for EscrowSummary {
    fn from(totals: EscrowTotals) -> Self {
        Self {
            total_deposits: totals.deposited,
            total_releases: totals.released,
            total_refunds: totals.refunded.saturating_add(totals.reversed),
            funds_in_dispute: totals.frozen,
            physical_balance: totals.physical(),
            available_balance: totals.available(),
        }
    }
}

/// Checks an intended debit against the available balance and hands back the
/// totals so the caller can recompute the derived balance after appending.
pub fn guard_release(
    entries: &[EscrowTransaction],
    amount: Money,
) -> Result<EscrowTotals, InvariantViolation> {
    let totals = EscrowTotals::from_entries(entries);
    if amount > totals.available() {
        return Err(InvariantViolation::InsufficientEscrowFunds {
            requested: amount,
            available: totals.available(),
        });
    }
    Ok(totals)
}

/// The settled milestone-release entry for a workflow release, unless a
/// completed refund has reversed it. This is the idempotency anchor: while
/// it exists, the payout has already debited escrow.
pub fn active_release_entry(
    entries: &[EscrowTransaction],
    release: ReleaseId,
) -> Option<&EscrowTransaction> {
    let entry = entries.iter().find(|e| {
        e.kind == TransactionKind::MilestoneRelease
            && e.status == TransactionStatus::Completed
            && e.release == Some(release)
    })?;
    if reversal_of(entries, entry.id).is_some() {
        None
    } else {
        Some(entry)
    }
}

/// The completed refund entry compensating `original`, if any.
pub fn reversal_of(
    entries: &[EscrowTransaction],
    original: TransactionId,
) -> Option<&EscrowTransaction> {
    entries.iter().find(|r| {
        matches!(
            r.kind,
            TransactionKind::Refund | TransactionKind::PartialRefund
        ) && r.status == TransactionStatus::Completed
            && r.original_transaction == Some(original)
    })
}

/// Sum already refunded against a deposit, full or partial.
pub fn refunded_against(entries: &[EscrowTransaction], original: TransactionId) -> Money {
    entries
        .iter()
        .filter(|r| {
            matches!(
                r.kind,
                TransactionKind::Refund | TransactionKind::PartialRefund
            ) && r.status == TransactionStatus::Completed
                && r.original_transaction == Some(original)
        })
        .fold(Money::ZERO, |acc, r| acc.saturating_add(r.amount))
}
