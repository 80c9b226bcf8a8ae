// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Secondary Market Use Cases
//!
//! Application service for investor-to-investor share transfers. Opening a
//! transfer checks the seller's position and the lock-in window; completing
//! it moves ownership in one locked transaction.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Guard and settle ownership moves between investors
//! - **Collaborators:**
//!   - Domain: ShareTransfer, ShareOwnership, Investment
//!   - Infrastructure: LedgerStore, EscrowEventBus

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::error::{EngineError, InvariantViolation, ValidationError};
use crate::domain::events::EscrowEvent;
use crate::domain::ids::{AppId, TransactionId, TransferId, UserId};
use crate::domain::investment::ShareOwnership;
use crate::domain::primitives::{Money, Percentage};
use crate::domain::store::{AppSession, LedgerStore};
use crate::domain::transfer::{lock_in_end, ShareTransfer};
use crate::infrastructure::event_bus::EscrowEventBus;

pub struct TransferService {
    store: Arc<dyn LedgerStore>,
    events: Arc<EscrowEventBus>,
}

impl TransferService {
    pub fn new(store: Arc<dyn LedgerStore>, events: Arc<EscrowEventBus>) -> Self {
        Self { store, events }
    }

    /// Opens a PENDING transfer after checking the seller's position and
    /// the lock-in window on their earliest investment.
    pub async fn open_transfer(
        &self,
        app_id: AppId,
        seller: UserId,
        buyer: UserId,
        percentage_amount: Percentage,
        price_per_percentage: Money,
    ) -> Result<ShareTransfer, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;

        let held = session
            .ownership(seller)
            .await?
            .map(|o| o.percentage_owned)
            .unwrap_or(Percentage::ZERO);
        if held < percentage_amount {
            return Err(InvariantViolation::InsufficientOwnership {
                held,
                requested: percentage_amount,
            }
            .into());
        }

        let earliest = session
            .investments()
            .await?
            .into_iter()
            .filter(|i| i.investor == seller)
            .map(|i| i.created_at)
            .min();
        if let Some(first_investment) = earliest {
            let until = lock_in_end(first_investment, session.app().lock_in_period_days);
            if Utc::now() < until {
                return Err(ValidationError::WithinLockInPeriod { until }.into());
            }
        }

        let currency = session.app().currency.clone();
        let transfer = ShareTransfer::new(
            app_id,
            seller,
            buyer,
            percentage_amount,
            price_per_percentage,
            currency,
        )?;
        session.insert_transfer(&transfer).await?;
        session.commit().await?;

        info!(
            app_id = %app_id,
            transfer_id = %transfer.id,
            seller = %seller,
            buyer = %buyer,
            percentage = %percentage_amount,
            "Share transfer opened"
        );
        Ok(transfer)
    }

    /// Settles a PENDING transfer: ownership moves seller to buyer and the
    /// transfer closes, all in one transaction. The optional entry id links
    /// the buyer's payment when it ran through escrow.
    pub async fn complete_transfer(
        &self,
        app_id: AppId,
        transfer_id: TransferId,
        escrow_transaction: Option<TransactionId>,
    ) -> Result<ShareTransfer, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut transfer = find_transfer(session.as_mut(), transfer_id).await?;

        transfer.complete(escrow_transaction)?;

        let mut seller_position = session
            .ownership(transfer.seller)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "ShareOwnership",
                id: transfer.seller.0,
            })?;
        seller_position.decrease(transfer.percentage_amount)?;

        let mut buyer_position = session
            .ownership(transfer.buyer)
            .await?
            .unwrap_or_else(|| ShareOwnership::new(transfer.buyer, app_id));
        buyer_position.increase(transfer.percentage_amount)?;

        session.upsert_ownership(&seller_position).await?;
        session.upsert_ownership(&buyer_position).await?;
        session.update_transfer(&transfer).await?;
        session.commit().await?;

        self.events.publish(EscrowEvent::SharesTransferred {
            app_id,
            transfer_id,
            seller: transfer.seller,
            buyer: transfer.buyer,
            percentage_amount: transfer.percentage_amount,
            transferred_at: Utc::now(),
        });
        info!(
            app_id = %app_id,
            transfer_id = %transfer_id,
            percentage = %transfer.percentage_amount,
            total = %transfer.total_amount,
            "Share transfer completed"
        );
        Ok(transfer)
    }

    pub async fn cancel_transfer(
        &self,
        app_id: AppId,
        transfer_id: TransferId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut transfer = find_transfer(session.as_mut(), transfer_id).await?;

        transfer.cancel()?;
        session.update_transfer(&transfer).await?;
        session.commit().await?;

        info!(app_id = %app_id, transfer_id = %transfer_id, "Share transfer cancelled");
        Ok(())
    }

    pub async fn reject_transfer(
        &self,
        app_id: AppId,
        transfer_id: TransferId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        let mut transfer = find_transfer(session.as_mut(), transfer_id).await?;

        transfer.reject_transfer()?;
        session.update_transfer(&transfer).await?;
        session.commit().await?;

        info!(app_id = %app_id, transfer_id = %transfer_id, "Share transfer rejected");
        Ok(())
    }

    pub async fn list_transfers(&self, app_id: AppId) -> Result<Vec<ShareTransfer>, EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        Ok(session.transfers().await?)
    }
}

async fn find_transfer(
    session: &mut dyn AppSession,
    transfer_id: TransferId,
) -> Result<ShareTransfer, EngineError> {
    session
        .find_transfer(transfer_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "ShareTransfer",
            id: transfer_id.0,
        })
}
