// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dispute Handling Use Cases
//!
//! Application service for the dispute lifecycle: opening a case freezes
//! the disputed deposit, resolution settles it toward the developer or
//! back toward the investor with a compensating ledger entry.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Coordinate the dispute case with the frozen
//!   ledger entry so both settle in one transaction
//! - **Collaborators:**
//!   - Domain: Dispute, EscrowTransaction, EscrowTotals
//!   - Infrastructure: LedgerStore, EscrowEventBus

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::dispute::Dispute;
use crate::domain::error::EngineError;
use crate::domain::escrow::{DisputeOutcome, EscrowTotals, EscrowTransaction};
use crate::domain::events::EscrowEvent;
use crate::domain::ids::{AppId, DisputeId, TransactionId, UserId};
use crate::domain::store::{AppSession, LedgerStore};
use crate::infrastructure::event_bus::EscrowEventBus;

pub struct DisputeService {
    store: Arc<dyn LedgerStore>,
    events: Arc<EscrowEventBus>,
}

impl DisputeService {
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<EscrowEventBus>) -> Self {
        Self { store, events }
    }

    /// Opens a dispute against a deposit. The entry is frozen in the same
    /// transaction, so the disputed amount leaves the available balance
    /// the moment the case exists.
    pub async fn open(
        &self,
        app_id: AppId,
        transaction_id: TransactionId,
        raised_by: UserId,
        reason: String,
    ) -> Result<Dispute, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut entry = find_entry(session.as_mut(), transaction_id).await?;

        entry.hold_for_dispute(reason.clone())?;
        let dispute = Dispute::new(app_id, transaction_id, raised_by, reason);

        session.update_entry(&entry).await?;
        session.insert_dispute(&dispute).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::DisputeOpened {
            app_id,
            dispute_id: dispute.id,
            transaction_id,
            raised_by,
            opened_at: Utc::now(),
        });
        info!(
            app_id = %app_id,
            dispute_id = %dispute.id,
            transaction_id = %transaction_id,
            amount = %entry.amount,
            "Dispute opened, deposit frozen"
        );
        Ok(dispute)
    }

    pub async fn assign(
        &self,
        app_id: AppId,
        dispute_id: DisputeId,
        reviewer: UserId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut dispute = find_dispute(session.as_mut(), dispute_id).await?;

        dispute.assign(reviewer)?;
        session.update_dispute(&dispute).await?;
        session.commit().await?;

        info!(app_id = %app_id, dispute_id = %dispute_id, reviewer = %reviewer, "Dispute assigned");
        Ok(())
    }

    pub async fn escalate(
        &self,
        app_id: AppId,
        dispute_id: DisputeId,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut dispute = find_dispute(session.as_mut(), dispute_id).await?;

        dispute.escalate(note)?;
        session.update_dispute(&dispute).await?;
        session.commit().await?;

        info!(app_id = %app_id, dispute_id = %dispute_id, "Dispute escalated");
        Ok(())
    }

    /// Settles the case. RESOLVED_RELEASE pays the frozen amount out to the
    /// developer; RESOLVED_REFUND returns it to the investor. Either way
    /// the compensating entry and the unfrozen original land atomically,
    /// and a second resolution attempt fails on the entity guards.
    pub async fn resolve(
        &self,
        app_id: AppId,
        dispute_id: DisputeId,
        resolver: UserId,
        outcome: DisputeOutcome,
        notes: Option<String>,
    ) -> Result<EscrowTransaction, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut dispute = find_dispute(session.as_mut(), dispute_id).await?;
        let mut entry = find_entry(session.as_mut(), dispute.transaction).await?;

        dispute.resolve(resolver, outcome, notes.clone())?;
        entry.resolve_dispute(resolver, outcome, notes)?;

        let entries = session.entries().await?;
        let totals = EscrowTotals::from_entries(&entries);
        let settlement = match outcome {
            DisputeOutcome::ResolvedRelease => {
                let developer = session.app().developer;
                EscrowTransaction::dispute_release(app_id, developer, entry.amount, entry.id)
            }
            DisputeOutcome::ResolvedRefund => {
                EscrowTransaction::refund(app_id, entry.investor, entry.amount, entry.id, false)
            }
        };

        session.update_dispute(&dispute).await?;
        session.update_entry(&entry).await?;
        session.insert_entry(&settlement).await?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_sub(entry.amount);
        session.commit().await?;

        self.events.publish(EscrowEvent::DisputeResolved {
            app_id,
            dispute_id,
            transaction_id: entry.id,
            outcome,
            resolved_by: resolver,
            resolved_at: Utc::now(),
        });
        info!(
            app_id = %app_id,
            dispute_id = %dispute_id,
            outcome = outcome.as_str(),
            amount = %entry.amount,
            "Dispute resolved"
        );
        Ok(settlement)
    }

    /// Archives a resolved case.
    pub async fn close(&self, app_id: AppId, dispute_id: DisputeId) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut dispute = find_dispute(session.as_mut(), dispute_id).await?;

        dispute.close()?;
        session.update_dispute(&dispute).await?;
        session.commit().await?;

        info!(app_id = %app_id, dispute_id = %dispute_id, "Dispute closed");
        Ok(())
    }

    pub async fn list(&self, app_id: AppId) -> Result<Vec<Dispute>, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        Ok(session.disputes().await?)
    }
}

async fn find_dispute(
    session: &mut dyn AppSession,
    dispute_id: DisputeId,
) -> Result<Dispute, EngineError> {
    session
        .find_dispute(dispute_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "Dispute",
            id: dispute_id.0,
        })
}

async fn find_entry(
    session: &mut dyn AppSession,
    transaction_id: TransactionId,
) -> Result<EscrowTransaction, EngineError> {
    session
        .find_entry(transaction_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "EscrowTransaction",
            id: transaction_id.0,
        })
}
