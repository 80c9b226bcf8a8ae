// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Secondary-market transfers of equity between investors.
//!
//! A transfer moves already-allocated percentage ownership from a seller to
//! a buyer at an agreed price. Ownership moves atomically with the
//! transfer's completion; the platform takes a flat fee on the sale price.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::{EngineError, StateTransitionError, ValidationError};
use crate::domain::ids::{AppId, TransactionId, TransferId, UserId};
use crate::domain::primitives::{ArithmeticError, Money, Percentage};

/// Platform fee on secondary sales, percent of the sale price.
const TRANSFER_FEE_PERCENT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Cancelled => "CANCELLED",
            TransferStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransferStatus::Pending),
            "COMPLETED" => Some(TransferStatus::Completed),
            "CANCELLED" => Some(TransferStatus::Cancelled),
            "REJECTED" => Some(TransferStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareTransfer {
    pub id: TransferId,
    pub app: AppId,
    pub seller: UserId,
    pub buyer: UserId,
    pub percentage_amount: Percentage,
    pub price_per_percentage: Money,
    pub total_amount: Money,
    pub currency: String,
    pub status: TransferStatus,
    pub escrow_transaction: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ShareTransfer {
    pub fn new(
        app: AppId,
        seller: UserId,
        buyer: UserId,
        percentage_amount: Percentage,
        price_per_percentage: Money,
        currency: String,
    ) -> Result<Self, EngineError> {
        if !percentage_amount.is_positive() {
            return Err(ValidationError::NonPositivePercentage {
                value: percentage_amount,
            }
            .into());
        }
        if !price_per_percentage.is_positive() {
            return Err(ValidationError::NonPositiveAmount {
                amount: price_per_percentage,
            }
            .into());
        }
        let total_amount = price_per_percentage.checked_mul(percentage_amount.value())?;

        let now = Utc::now();
        Ok(Self {
            id: TransferId::new(),
            app,
            seller,
            buyer,
            percentage_amount,
            price_per_percentage,
            total_amount,
            currency,
            status: TransferStatus::Pending,
            escrow_transaction: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Flat platform cut on the sale price.
    pub fn transaction_fee(&self) -> Result<Money, ArithmeticError> {
        self.total_amount
            .percent_of(Percentage::new(Decimal::from(TRANSFER_FEE_PERCENT)))
    }

    pub fn complete(
        &mut self,
        escrow_transaction: Option<TransactionId>,
    ) -> Result<(), StateTransitionError> {
        if self.status != TransferStatus::Pending {
            return Err(self.transition_error("complete"));
        }
        let now = Utc::now();
        self.status = TransferStatus::Completed;
        self.escrow_transaction = escrow_transaction;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), StateTransitionError> {
        if self.status != TransferStatus::Pending {
            return Err(self.transition_error("cancel"));
        }
        self.status = TransferStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn reject_transfer(&mut self) -> Result<(), StateTransitionError> {
        if self.status != TransferStatus::Pending {
            return Err(self.transition_error("reject"));
        }
        self.status = TransferStatus::Rejected;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition_error(&self, operation: &'static str) -> StateTransitionError {
        StateTransitionError::new(
            "ShareTransfer",
            self.id.0,
            operation,
            self.status.as_str().to_string(),
        )
    }
}

/// End of the seller's lock-in window, counted from their earliest
/// investment in the app.
pub fn lock_in_end(earliest_investment: DateTime<Utc>, lock_in_days: u32) -> DateTime<Utc> {
    earliest_investment + Duration::days(i64::from(lock_in_days))
}
