// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Investment Allocation Use Cases
//!
//! Application service that converts an investor's payment into a percentage
//! allocation against an app's equity pool, and unwinds it on refund.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Atomic investment → ownership → deposit writes under
//!   the app lock; the no-oversell invariant lives here
//! - **Collaborators:**
//!   - Domain: App, Investment, ShareOwnership, EscrowTransaction
//!   - Infrastructure: LedgerStore, EscrowEventBus

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::app::{AppStatus, PlatformFeeTransaction};
use crate::domain::error::{EngineError, InvariantViolation, StateTransitionError, ValidationError};
use crate::domain::escrow::{EscrowTotals, EscrowTransaction, TransactionKind};
use crate::domain::events::EscrowEvent;
use crate::domain::ids::{AppId, InvestmentId, UserId};
use crate::domain::investment::{Investment, ShareOwnership};
use crate::domain::primitives::{Money, Percentage};
use crate::domain::store::{AppSession, LedgerStore};
use crate::infrastructure::event_bus::EscrowEventBus;

pub struct AllocationService {
    store: Arc<dyn LedgerStore>,
    events: Arc<EscrowEventBus>,
    platform_fee_percent: Percentage,
}

impl AllocationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        events: Arc<EscrowEventBus>,
        platform_fee_percent: Percentage,
    ) -> Self {
        Self {
            store,
            events,
            platform_fee_percent,
        }
    }

    /// Allocates equity for a payment. Either every write lands (investment
    /// row, ownership increase, deposit entry, derived fields) or none do.
    pub async fn allocate(
        &self,
        investor: UserId,
        app_id: AppId,
        amount_paid: Money,
    ) -> Result<Investment, EngineError> {
        if !amount_paid.is_positive() {
            return Err(ValidationError::NonPositiveAmount {
                amount: amount_paid,
            }
            .into());
        }

        // Step 1: Take the app's exclusive session for the whole operation
        let mut session = self.store.lock_app(app_id).await?;
        let app = session.app().clone();

        if app.status != AppStatus::Active {
            return Err(StateTransitionError::new(
                "App",
                app_id.0,
                "accept investment",
                app.status.as_str(),
            )
            .into());
        }

        // Step 2: Size the purchase at the listed valuation
        let valuation = app.company_valuation()?;
        let percentage_bought = amount_paid.share_of(valuation)?;

        if percentage_bought < app.min_investment_percentage {
            return Err(ValidationError::BelowMinimumInvestment {
                bought: percentage_bought,
                minimum: app.min_investment_percentage,
            }
            .into());
        }

        // Step 3: Re-aggregate sold equity inside the lock and reject
        // oversell outright; the investor may retry with a smaller amount
        let total_invested = total_invested(session.as_mut()).await?;
        let new_total = total_invested.checked_add(percentage_bought)?;
        if new_total > app.available_percentage {
            return Err(InvariantViolation::OversellRejected {
                requested: percentage_bought,
                invested: total_invested,
                available: app.available_percentage,
            }
            .into());
        }

        // Step 4: Persist the investment and move ownership
        let investment = Investment::new(investor, app_id, amount_paid, percentage_bought);
        session.insert_investment(&investment).await?;

        let mut ownership = session
            .ownership(investor)
            .await?
            .unwrap_or_else(|| ShareOwnership::new(investor, app_id));
        ownership.increase(percentage_bought)?;
        session.upsert_ownership(&ownership).await?;

        // Step 5: Append the escrow deposit and recompute the derived fields
        let totals = EscrowTotals::from_entries(&session.entries().await?);
        let deposit =
            EscrowTransaction::deposit(app_id, investor, amount_paid, Some(investment.id));
        session.insert_entry(&deposit).await?;

        session.app_mut().recompute_remaining(new_total)?;
        session.app_mut().funds_in_escrow = totals.physical().saturating_add(amount_paid);

        // Step 6: Close the round when the pool is exhausted
        let fully_funded = !session.app().remaining_percentage.is_positive();
        let total_raised = session.app().funds_in_escrow;
        if fully_funded {
            session.app_mut().mark_funded()?;
            self.ensure_platform_fee(session.as_mut()).await?;
        }

        session.commit().await?;

        // Step 7: Publish after commit
        self.events.publish(EscrowEvent::InvestmentAllocated {
            app_id,
            investment_id: investment.id,
            investor,
            amount: amount_paid,
            percentage_bought,
            allocated_at: investment.created_at,
        });
        if fully_funded {
            self.events.publish(EscrowEvent::AppFullyFunded {
                app_id,
                total_invested: total_raised,
                funded_at: Utc::now(),
            });
        }

        info!(
            app_id = %app_id,
            investor = %investor,
            amount = %amount_paid,
            percentage = %percentage_bought,
            fully_funded,
            "Investment allocated"
        );
        Ok(investment)
    }

    /// Unwinds one investment: compensating REFUND entry, ownership
    /// decrease, investment row removal, derived-field recompute. Reopens a
    /// FUNDED round when the refund frees up equity.
    pub async fn refund_investment(
        &self,
        app_id: AppId,
        investment_id: InvestmentId,
    ) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;

        let investment =
            session
                .find_investment(investment_id)
                .await?
                .ok_or(EngineError::NotFound {
                    entity: "Investment",
                    id: investment_id.0,
                })?;

        // Step 1: Locate the deposit this investment paid in. A deposit
        // frozen under dispute is no longer a Deposit and cannot be
        // refunded from here.
        let entries = session.entries().await?;
        let mut deposit = entries
            .iter()
            .find(|e| {
                e.kind == TransactionKind::Deposit && e.investment == Some(investment_id)
            })
            .cloned()
            .ok_or(EngineError::NotFound {
                entity: "EscrowTransaction",
                id: investment_id.0,
            })?;

        // Step 2: Append the compensating entry and mark the deposit
        let refund = EscrowTransaction::refund(
            app_id,
            investment.investor,
            investment.amount_paid,
            deposit.id,
            false,
        );
        deposit.mark_refunded(false)?;
        session.insert_entry(&refund).await?;
        session.update_entry(&deposit).await?;

        // Step 3: Reverse ownership
        let mut ownership = session
            .ownership(investment.investor)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "ShareOwnership",
                id: investment.investor.0,
            })?;
        ownership.decrease(investment.percentage_bought)?;
        session.upsert_ownership(&ownership).await?;

        // Step 4: Remove the investment and recompute the derived fields
        let remaining_total = total_invested(session.as_mut())
            .await?
            .checked_sub(investment.percentage_bought)?;
        session.delete_investment(investment_id).await?;
        session.app_mut().recompute_remaining(remaining_total)?;

        let totals = EscrowTotals::from_entries(&entries);
        session.app_mut().funds_in_escrow =
            totals.physical().saturating_sub(investment.amount_paid);

        // Step 5: Freed equity reopens a closed round
        if session.app().status == AppStatus::Funded
            && session.app().remaining_percentage.is_positive()
        {
            session.app_mut().reopen()?;
        }

        session.commit().await?;

        self.events.publish(EscrowEvent::InvestmentRefunded {
            app_id,
            investment_id,
            investor: investment.investor,
            amount: investment.amount_paid,
            refunded_at: Utc::now(),
        });

        info!(
            app_id = %app_id,
            investment_id = %investment_id,
            amount = %investment.amount_paid,
            "Investment refunded"
        );
        Ok(())
    }

    /// Creates the platform's fee record the first time the app reaches
    /// FUNDED. Safe to call again; an existing record is left alone.
    async fn ensure_platform_fee(&self, session: &mut dyn AppSession) -> Result<(), EngineError> {
        if session.find_platform_fee().await?.is_some() {
            return Ok(());
        }
        let amount = session.app().platform_fee(self.platform_fee_percent)?;
        let fee = PlatformFeeTransaction::new(session.app().id, amount);
        session.insert_platform_fee(&fee).await?;
        Ok(())
    }
}

/// Sum of `percentage_bought` across the app's current investments,
/// evaluated inside the caller's session.
pub(crate) async fn total_invested(
    session: &mut dyn AppSession,
) -> Result<Percentage, EngineError> {
    let investments = session.investments().await?;
    Ok(investments
        .iter()
        .fold(Percentage::ZERO, |acc, i| {
            acc.saturating_add(i.percentage_bought)
        }))
}
