// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # App Equity Pool
//!
//! An [`App`] is the aggregate root of one funding round: the equity pool on
//! offer, the derived remaining percentage, and the derived escrow balance.
//!
//! # Architecture
//!
//! - **Lifecycle:** PENDING → ACTIVE → FUNDED → COMPLETED, with
//!   REJECTED/ON_HOLD side states
//! - **Derived fields:** `remaining_percentage` and `funds_in_escrow` are
//!   never incremented in place; services recompute them from the backing
//!   rows inside the same locked transaction (see `domain::store`)
//! - **Activation gate:** an app needs at least two milestones whose release
//!   percentages sum to exactly 100% before it can accept investments

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::{EngineError, StateTransitionError, ValidationError};
use crate::domain::ids::{AppId, FeeId, UserId};
use crate::domain::milestone::ProjectMilestone;
use crate::domain::primitives::{Money, Percentage, UseOfFunds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Pending,
    Active,
    Funded,
    Completed,
    Rejected,
    OnHold,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Pending => "PENDING",
            AppStatus::Active => "ACTIVE",
            AppStatus::Funded => "FUNDED",
            AppStatus::Completed => "COMPLETED",
            AppStatus::Rejected => "REJECTED",
            AppStatus::OnHold => "ON_HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AppStatus::Pending),
            "ACTIVE" => Some(AppStatus::Active),
            "FUNDED" => Some(AppStatus::Funded),
            "COMPLETED" => Some(AppStatus::Completed),
            "REJECTED" => Some(AppStatus::Rejected),
            "ON_HOLD" => Some(AppStatus::OnHold),
            _ => None,
        }
    }
}

/// Listing parameters supplied by the developer when registering an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSubmission {
    pub name: String,
    pub developer: UserId,
    pub currency: String,
    /// Exchange rate against the platform's reporting currency, recorded as
    /// a snapshot at listing time. Conversion correctness is out of scope.
    pub exchange_rate: Decimal,
    pub funding_goal: Money,
    pub available_percentage: Percentage,
    pub min_investment_percentage: Percentage,
    pub lock_in_period_days: u32,
    pub use_of_funds: UseOfFunds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    pub developer: UserId,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub funding_goal: Money,
    pub available_percentage: Percentage,
    pub remaining_percentage: Percentage,
    pub min_investment_percentage: Percentage,
    pub funds_in_escrow: Money,
    pub lock_in_period_days: u32,
    pub use_of_funds: UseOfFunds,
    pub status: AppStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl App {
    pub fn new(submission: AppSubmission) -> Result<Self, ValidationError> {
        if !submission.funding_goal.is_positive() {
            return Err(ValidationError::NonPositiveAmount {
                amount: submission.funding_goal,
            });
        }
        if !submission.available_percentage.is_positive()
            || submission.available_percentage > Percentage::HUNDRED
        {
            return Err(ValidationError::EquityOfferedOutOfRange {
                value: submission.available_percentage,
            });
        }
        if submission.min_investment_percentage.value().is_sign_negative() {
            return Err(ValidationError::NonPositivePercentage {
                value: submission.min_investment_percentage,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: AppId::new(),
            name: submission.name,
            developer: submission.developer,
            currency: submission.currency,
            exchange_rate: submission.exchange_rate,
            funding_goal: submission.funding_goal,
            available_percentage: submission.available_percentage,
            remaining_percentage: submission.available_percentage,
            min_investment_percentage: submission.min_investment_percentage,
            funds_in_escrow: Money::ZERO,
            lock_in_period_days: submission.lock_in_period_days,
            use_of_funds: submission.use_of_funds,
            status: AppStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// `funding_goal / available_percentage * 100`: the implied valuation
    /// of the whole company at the listed terms.
    pub fn company_valuation(&self) -> Result<Money, EngineError> {
        if self.available_percentage.is_zero() {
            return Err(ValidationError::ValuationUndefined.into());
        }
        let raw = self
            .funding_goal
            .amount()
            .checked_div(self.available_percentage.value())
            .ok_or(ValidationError::ValuationUndefined)?
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(crate::domain::primitives::ArithmeticError::Overflow)?;
        Ok(Money::new(raw))
    }

    /// Moves the app onto the market. Requires at least two milestones whose
    /// release percentages sum to exactly 100%.
    pub fn activate(&mut self, milestones: &[ProjectMilestone]) -> Result<(), EngineError> {
        if self.status != AppStatus::Pending {
            return Err(self.transition_error("activate").into());
        }
        if milestones.len() < 2 {
            return Err(ValidationError::TooFewMilestones {
                count: milestones.len(),
            }
            .into());
        }
        let total = milestones
            .iter()
            .fold(Percentage::ZERO, |acc, m| acc.saturating_add(m.release_percentage));
        if total != Percentage::HUNDRED {
            return Err(ValidationError::MilestonePercentageSum { total }.into());
        }
        self.status = AppStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_funded(&mut self) -> Result<(), StateTransitionError> {
        if self.status != AppStatus::Active {
            return Err(self.transition_error("mark funded"));
        }
        self.status = AppStatus::Funded;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns a FUNDED app to the market after a refund freed up equity.
    pub fn reopen(&mut self) -> Result<(), StateTransitionError> {
        if self.status != AppStatus::Funded {
            return Err(self.transition_error("reopen"));
        }
        self.status = AppStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), StateTransitionError> {
        if self.status != AppStatus::Funded {
            return Err(self.transition_error("complete"));
        }
        self.status = AppStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), StateTransitionError> {
        if self.status != AppStatus::Pending {
            return Err(self.transition_error("reject"));
        }
        self.status = AppStatus::Rejected;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn put_on_hold(&mut self) -> Result<(), StateTransitionError> {
        if !matches!(self.status, AppStatus::Active | AppStatus::Funded) {
            return Err(self.transition_error("put on hold"));
        }
        self.status = AppStatus::OnHold;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), StateTransitionError> {
        if self.status != AppStatus::OnHold {
            return Err(self.transition_error("resume"));
        }
        self.status = AppStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Recomputes `remaining_percentage` from the current sum of active
    /// investments. Callers hold the app lock and pass the freshly
    /// aggregated total.
    pub fn recompute_remaining(
        &mut self,
        total_invested: Percentage,
    ) -> Result<(), crate::domain::primitives::ArithmeticError> {
        self.remaining_percentage = self.available_percentage.checked_sub(total_invested)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The platform's fee for a funded round.
    pub fn platform_fee(
        &self,
        fee_percent: Percentage,
    ) -> Result<Money, crate::domain::primitives::ArithmeticError> {
        self.funding_goal.percent_of(fee_percent)
    }

    fn transition_error(&self, operation: &'static str) -> StateTransitionError {
        StateTransitionError::new("App", self.id.0, operation, self.status.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeStatus {
    Pending,
    Completed,
    Failed,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Pending => "PENDING",
            FeeStatus::Completed => "COMPLETED",
            FeeStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(FeeStatus::Pending),
            "COMPLETED" => Some(FeeStatus::Completed),
            "FAILED" => Some(FeeStatus::Failed),
            _ => None,
        }
    }
}

/// The platform's fee record for a funded app. Created once, idempotently,
/// when the app reaches FUNDED; settlement is an operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformFeeTransaction {
    pub id: FeeId,
    pub app: AppId,
    pub amount: Money,
    pub status: FeeStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl PlatformFeeTransaction {
    pub fn new(app: AppId, amount: Money) -> Self {
        Self {
            id: FeeId::new(),
            app,
            amount,
            status: FeeStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn settle(&mut self) -> Result<(), StateTransitionError> {
        if self.status != FeeStatus::Pending {
            return Err(StateTransitionError::new(
                "PlatformFeeTransaction",
                self.id.0,
                "settle",
                self.status.as_str(),
            ));
        }
        self.status = FeeStatus::Completed;
        self.settled_at = Some(Utc::now());
        Ok(())
    }
}
