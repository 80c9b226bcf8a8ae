// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Escrow Ledger Use Cases
//!
//! Application service over the append-only ledger: deposits in, releases
//! and refunds out, and the read-only summary. Every balance check and the
//! entry it guards happen inside one locked session; the derived
//! `funds_in_escrow` is recomputed from the same fold the check used.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Balance-guarded ledger appends
//! - **Collaborators:**
//!   - Domain: EscrowTransaction, EscrowTotals
//!   - Infrastructure: LedgerStore
//!
//! Milestone payouts do not come through here; they go through the release
//! workflow, which owns the idempotency anchor. Dispute freezes go through
//! the dispute resolver, the single freeze entry point.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::error::{EngineError, InvariantViolation, ValidationError};
use crate::domain::escrow::{
    guard_release, refunded_against, EscrowSummary, EscrowTotals, EscrowTransaction,
};
use crate::domain::ids::{AppId, MilestoneId, TransactionId, UserId};
use crate::domain::primitives::{Money, Percentage};
use crate::domain::store::LedgerStore;

pub struct EscrowLedgerService {
    store: Arc<dyn LedgerStore>,
}

impl EscrowLedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Appends a settled deposit and bumps the derived balance.
    pub async fn deposit(
        &self,
        app_id: AppId,
        investor: UserId,
        amount: Money,
    ) -> Result<EscrowTransaction, EngineError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount { amount }.into());
        }

        let mut session = self.store.lock_app(app_id).await?;
        let totals = EscrowTotals::from_entries(&session.entries().await?);

        let entry = EscrowTransaction::deposit(app_id, investor, amount, None);
        session.insert_entry(&entry).await?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_add(amount);
        session.commit().await?;

        info!(app_id = %app_id, amount = %amount, "Escrow deposit recorded");
        Ok(entry)
    }

    /// Releases funds to a recipient, bounded by the available balance.
    ///
    /// This is the manual path for operator-driven payouts; milestone
    /// payouts are debited by the release workflow instead.
    pub async fn release(
        &self,
        app_id: AppId,
        recipient: UserId,
        amount: Money,
        milestone: Option<MilestoneId>,
    ) -> Result<EscrowTransaction, EngineError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount { amount }.into());
        }

        let mut session = self.store.lock_app(app_id).await?;
        let entries = session.entries().await?;
        let totals = guard_release(&entries, amount)?;

        let entry = EscrowTransaction::release_entry(app_id, recipient, amount, milestone);
        session.insert_entry(&entry).await?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_sub(amount);
        session.commit().await?;

        info!(app_id = %app_id, amount = %amount, "Escrow release recorded");
        Ok(entry)
    }

    /// Refunds part or all of a settled deposit back to its investor. The
    /// refund is bounded both by what is still refundable against the
    /// deposit and by the app's available balance.
    pub async fn refund_deposit(
        &self,
        app_id: AppId,
        transaction_id: TransactionId,
        refund_percentage: Percentage,
    ) -> Result<EscrowTransaction, EngineError> {
        if !refund_percentage.is_positive() || refund_percentage > Percentage::HUNDRED {
            return Err(ValidationError::RefundPercentageOutOfRange {
                value: refund_percentage,
            }
            .into());
        }

        let mut session = self.store.lock_app(app_id).await?;
        let entries = session.entries().await?;

        let mut deposit = entries
            .iter()
            .find(|e| e.id == transaction_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                entity: "EscrowTransaction",
                id: transaction_id.0,
            })?;

        let refund_amount = deposit.amount.percent_of(refund_percentage)?;
        let already_refunded = refunded_against(&entries, deposit.id);
        let refundable = deposit.amount.saturating_sub(already_refunded);
        if refund_amount > refundable {
            return Err(InvariantViolation::InsufficientEscrowFunds {
                requested: refund_amount,
                available: refundable,
            }
            .into());
        }
        let totals = guard_release(&entries, refund_amount)?;

        let exhausts_deposit =
            already_refunded.saturating_add(refund_amount) == deposit.amount;
        let refund = EscrowTransaction::refund(
            app_id,
            deposit.investor,
            refund_amount,
            deposit.id,
            !exhausts_deposit,
        );
        deposit.mark_refunded(!exhausts_deposit)?;

        session.insert_entry(&refund).await?;
        session.update_entry(&deposit).await?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_sub(refund_amount);
        session.commit().await?;

        info!(
            app_id = %app_id,
            transaction_id = %transaction_id,
            amount = %refund_amount,
            partial = !exhausts_deposit,
            "Deposit refunded"
        );
        Ok(refund)
    }

    /// Point-in-time escrow report. Evaluated under the app lock so the
    /// numbers are mutually consistent; no writes happen.
    pub async fn summary(&self, app_id: AppId) -> Result<EscrowSummary, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let totals = EscrowTotals::from_entries(&session.entries().await?);
        debug!(app_id = %app_id, physical = %totals.physical(), "Escrow summary computed");
        Ok(totals.into())
    }
}
