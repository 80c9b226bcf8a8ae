// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Release Workflow Use Cases
//!
//! Application service that drives a milestone payout from approval through
//! the external transfer to the settled ledger entry, with retry and
//! rollback for the partial-failure paths.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** The one canonical escrow-debit path for milestone
//!   payouts
//! - **Collaborators:**
//!   - Domain: Release, EscrowTransaction, EscrowTotals
//!   - Infrastructure: LedgerStore, PaymentGateway, EscrowEventBus
//!
//! # Payout shape
//!
//! The payout runs in two transactions with the gateway call between them
//! and no lock held across it:
//!
//! 1. Lock the app, check the idempotency anchor and debit feasibility,
//!    move the release to PROCESSING, commit.
//! 2. Initiate the transfer; cross-check the receipt's amount, currency,
//!    and state; a PENDING receipt is re-verified by reference.
//! 3. Re-lock and settle: append the MILESTONE_RELEASE entry, complete the
//!    release, recompute the balance. A gateway failure instead marks the
//!    release FAILED in its own transaction and surfaces the error.
//!
//! A settled, unreversed MILESTONE_RELEASE entry keyed by the release id is
//! the idempotency anchor: while it exists neither `process` nor `retry`
//! will contact the gateway or debit escrow again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::error::{EngineError, StateTransitionError};
use crate::domain::escrow::{
    active_release_entry, guard_release, reversal_of, EscrowTotals, EscrowTransaction,
    TransactionKind, TransactionStatus,
};
use crate::domain::events::EscrowEvent;
use crate::domain::gateway::{
    GatewayError, PaymentGateway, RecipientAccount, TransferReceipt, TransferState,
};
use crate::domain::ids::{AppId, MilestoneId, ReleaseId, TransactionId, UserId};
use crate::domain::milestone::MilestoneStatus;
use crate::domain::primitives::Money;
use crate::domain::release::{Release, ReleaseStatus};
use crate::domain::store::{AppSession, LedgerStore};
use crate::infrastructure::event_bus::EscrowEventBus;

pub struct ReleaseService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<EscrowEventBus>,
}

impl ReleaseService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<EscrowEventBus>,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
        }
    }

    /// Records the developer's one approval request on a pending release.
    pub async fn request_approval(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        requested_by: UserId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut release = find_release(session.as_mut(), release_id).await?;

        release.request_approval(requested_by)?;
        session.update_release(&release).await?;
        session.commit().await?;

        info!(app_id = %app_id, release_id = %release_id, "Release approval requested");
        Ok(())
    }

    pub async fn approve(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        approver: UserId,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut release = find_release(session.as_mut(), release_id).await?;

        release.approve(approver, notes)?;
        session.update_release(&release).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::ReleaseApproved {
            app_id,
            release_id,
            milestone_id: release.milestone,
            approved_by: approver,
            approved_at: Utc::now(),
        });
        info!(app_id = %app_id, release_id = %release_id, "Release approved");
        Ok(())
    }

    pub async fn reject(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        approver: UserId,
        reason: String,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut release = find_release(session.as_mut(), release_id).await?;

        release.reject(approver, reason.clone())?;
        session.update_release(&release).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::ReleaseRejected {
            app_id,
            release_id,
            rejected_by: approver,
            reason,
            rejected_at: Utc::now(),
        });
        info!(app_id = %app_id, release_id = %release_id, "Release rejected");
        Ok(())
    }

    /// Drives an APPROVED release through the gateway to settlement.
    pub async fn process(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        recipient: &RecipientAccount,
    ) -> Result<Release, EngineError> {
        // Transaction 1: claim the release under the lock
        let (amount, currency) = {
            let mut session = self.store.lock_app(app_id).await?;
            let mut release = find_release(session.as_mut(), release_id).await?;
            let entries = session.entries().await?;

            if let Some(anchor) = active_release_entry(&entries, release_id) {
                // Payout already debited; finalize state and stop before
                // the gateway is contacted again
                let reference = anchor.gateway_reference.clone();
                return self.finalize_settled(session, release, reference).await;
            }

            guard_release(&entries, release.amount)?;
            release.mark_processing()?;
            session.update_release(&release).await?;
            let currency = session.app().currency.clone();
            session.commit().await?;
            (release.amount, currency)
        };

        self.transfer_and_settle(app_id, release_id, recipient, amount, &currency)
            .await
    }

    /// Re-attempts a FAILED payout. Idempotent with respect to the ledger:
    /// a still-standing anchor completes the release without a new transfer
    /// or debit.
    pub async fn retry(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        admin: UserId,
        recipient: &RecipientAccount,
    ) -> Result<Release, EngineError> {
        let (amount, currency) = {
            let mut session = self.store.lock_app(app_id).await?;
            let mut release = find_release(session.as_mut(), release_id).await?;
            let entries = session.entries().await?;

            if let Some(anchor) = active_release_entry(&entries, release_id) {
                let reference = anchor.gateway_reference.clone();
                return self.finalize_settled(session, release, reference).await;
            }

            guard_release(&entries, release.amount)?;
            release.begin_retry()?;
            session.update_release(&release).await?;
            let currency = session.app().currency.clone();
            session.commit().await?;

            info!(
                app_id = %app_id,
                release_id = %release_id,
                admin = %admin,
                "Release payout retry started"
            );
            (release.amount, currency)
        };

        self.transfer_and_settle(app_id, release_id, recipient, amount, &currency)
            .await
    }

    /// Marks a stuck payout FAILED. The reconciliation path for a release
    /// left PROCESSING by a gateway timeout.
    pub async fn fail_release(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        reason: String,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut release = find_release(session.as_mut(), release_id).await?;

        release.fail(reason.clone())?;
        session.update_release(&release).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::ReleaseFailed {
            app_id,
            release_id,
            reason,
            failed_at: Utc::now(),
        });
        warn!(app_id = %app_id, release_id = %release_id, "Release marked failed");
        Ok(())
    }

    /// Reverses a settled milestone payout that never reached the
    /// developer: appends the compensating REFUND, re-credits the balance,
    /// and fails the workflow release so it can be retried.
    pub async fn rollback(
        &self,
        app_id: AppId,
        transaction_id: TransactionId,
        reason: String,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let entries = session.entries().await?;

        let entry = entries
            .iter()
            .find(|e| e.id == transaction_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                entity: "EscrowTransaction",
                id: transaction_id.0,
            })?;

        if entry.kind != TransactionKind::MilestoneRelease
            || entry.status != TransactionStatus::Completed
        {
            return Err(StateTransitionError::new(
                "EscrowTransaction",
                transaction_id.0,
                "roll back",
                format!("{} ({})", entry.kind.as_str(), entry.status.as_str()),
            )
            .into());
        }
        if reversal_of(&entries, entry.id).is_some() {
            return Err(StateTransitionError::new(
                "EscrowTransaction",
                transaction_id.0,
                "roll back",
                "already reversed".to_string(),
            )
            .into());
        }
        let release_id = entry.release.ok_or_else(|| {
            StateTransitionError::new(
                "EscrowTransaction",
                transaction_id.0,
                "roll back",
                "MILESTONE_RELEASE without a release link".to_string(),
            )
        })?;

        let mut release = find_release(session.as_mut(), release_id).await?;
        release.mark_rolled_back(reason)?;

        let reversal =
            EscrowTransaction::refund(app_id, entry.investor, entry.amount, entry.id, false);
        let totals = EscrowTotals::from_entries(&entries);

        session.insert_entry(&reversal).await?;
        session.update_release(&release).await?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_add(entry.amount);
        session.commit().await?;

        self.events.publish(EscrowEvent::ReleaseRolledBack {
            app_id,
            release_id,
            amount: entry.amount,
            rolled_back_at: Utc::now(),
        });
        warn!(
            app_id = %app_id,
            release_id = %release_id,
            amount = %entry.amount,
            "Release rolled back"
        );
        Ok(())
    }

    /// Opens a replacement release for a VERIFIED milestone whose previous
    /// releases were all rejected.
    pub async fn request_new(
        &self,
        app_id: AppId,
        milestone_id: MilestoneId,
    ) -> Result<Release, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;

        let milestone = session
            .find_milestone(milestone_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "ProjectMilestone",
                id: milestone_id.0,
            })?;
        if milestone.status != MilestoneStatus::Verified {
            return Err(StateTransitionError::new(
                "ProjectMilestone",
                milestone_id.0,
                "request release",
                milestone.status.as_str(),
            )
            .into());
        }

        let releases = session.releases().await?;
        if let Some(blocking) = releases
            .iter()
            .find(|r| r.milestone == milestone_id && r.status != ReleaseStatus::Rejected)
        {
            return Err(StateTransitionError::new(
                "Release",
                blocking.id.0,
                "create",
                format!("{} release exists for this milestone", blocking.status.as_str()),
            )
            .into());
        }

        let amount = milestone.release_amount(session.app().funding_goal)?;
        let release = Release::new(app_id, milestone_id, amount);
        session.insert_release(&release).await?;
        session.commit().await?;

        info!(
            app_id = %app_id,
            milestone_id = %milestone_id,
            release_id = %release.id,
            "Replacement release opened"
        );
        Ok(release)
    }

    /// Gateway call with no lock held, then the settling transaction.
    async fn transfer_and_settle(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        recipient: &RecipientAccount,
        amount: Money,
        currency: &str,
    ) -> Result<Release, EngineError> {
        match self.execute_transfer(recipient, amount, currency).await {
            Ok(receipt) => self.settle(app_id, release_id, receipt).await,
            Err(gateway_err) => {
                let mut session = self.store.lock_app(app_id).await?;
                let mut release = find_release(session.as_mut(), release_id).await?;
                release.fail(gateway_err.to_string())?;
                session.update_release(&release).await?;
                session.commit().await?;

                self.events.publish(EscrowEvent::ReleaseFailed {
                    app_id,
                    release_id,
                    reason: gateway_err.to_string(),
                    failed_at: Utc::now(),
                });
                warn!(
                    app_id = %app_id,
                    release_id = %release_id,
                    error = %gateway_err,
                    "Release payout failed at the gateway"
                );
                Err(gateway_err.into())
            }
        }
    }

    /// Initiates the transfer and cross-checks the provider's answer. A
    /// PENDING receipt is re-verified by reference before it is trusted.
    async fn execute_transfer(
        &self,
        recipient: &RecipientAccount,
        amount: Money,
        currency: &str,
    ) -> Result<TransferReceipt, GatewayError> {
        let mut receipt = self
            .gateway
            .initiate_transfer(recipient, amount, currency)
            .await?;

        if receipt.state == TransferState::Pending {
            let verified = self.gateway.verify_transaction(&receipt.reference).await?;
            if verified.reference != receipt.reference {
                return Err(GatewayError::ReferenceMismatch {
                    expected: receipt.reference,
                    reported: verified.reference,
                });
            }
            receipt = verified;
        }

        if receipt.amount != amount {
            return Err(GatewayError::AmountMismatch {
                expected: amount,
                reported: receipt.amount,
            });
        }
        if receipt.currency != currency {
            return Err(GatewayError::MalformedResponse(format!(
                "transfer settled in {} instead of {}",
                receipt.currency, currency
            )));
        }
        match receipt.state {
            TransferState::Success => Ok(receipt),
            TransferState::Pending => Err(GatewayError::Request(
                "transfer still pending after verification".to_string(),
            )),
            TransferState::Failed => {
                Err(GatewayError::Declined(format!("transfer {}", receipt.reference)))
            }
        }
    }

    /// Transaction 2: append the anchor entry, complete the release,
    /// recompute the balance.
    async fn settle(
        &self,
        app_id: AppId,
        release_id: ReleaseId,
        receipt: TransferReceipt,
    ) -> Result<Release, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut release = find_release(session.as_mut(), release_id).await?;
        let entries = session.entries().await?;

        if let Some(anchor) = active_release_entry(&entries, release_id) {
            // A concurrent settle won; keep its entry and only align state
            let reference = anchor.gateway_reference.clone();
            return self.finalize_settled(session, release, reference).await;
        }

        let totals = guard_release(&entries, release.amount)?;
        let developer = session.app().developer;
        let entry = EscrowTransaction::milestone_release(
            app_id,
            developer,
            release.amount,
            release.milestone,
            release_id,
            Some(receipt.reference.clone()),
        );
        release.complete(Some(receipt.reference))?;

        session.insert_entry(&entry).await?;
        session.update_release(&release).await?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_sub(release.amount);
        session.commit().await?;

        self.events.publish(EscrowEvent::ReleaseCompleted {
            app_id,
            release_id,
            milestone_id: release.milestone,
            amount: release.amount,
            gateway_reference: release.transaction_reference.clone(),
            completed_at: Utc::now(),
        });
        info!(
            app_id = %app_id,
            release_id = %release_id,
            amount = %release.amount,
            "Release settled"
        );
        Ok(release)
    }

    /// The payout is already on the ledger; bring the workflow row in line
    /// without touching the balance.
    async fn finalize_settled(
        &self,
        mut session: Box<dyn AppSession>,
        mut release: Release,
        reference: Option<String>,
    ) -> Result<Release, EngineError> {
        if release.status == ReleaseStatus::Completed {
            return Ok(release);
        }
        if release.status == ReleaseStatus::Failed {
            release.begin_retry()?;
        }
        if release.status == ReleaseStatus::Approved {
            release.mark_processing()?;
        }
        release.complete(reference)?;
        session.update_release(&release).await?;
        let app_id = release.app;
        session.commit().await?;

        info!(
            app_id = %app_id,
            release_id = %release.id,
            "Release finalized against existing settled payout"
        );
        Ok(release)
    }
}

async fn find_release(
    session: &mut dyn AppSession,
    release_id: ReleaseId,
) -> Result<Release, EngineError> {
    session
        .find_release(release_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "Release",
            id: release_id.0,
        })
}
