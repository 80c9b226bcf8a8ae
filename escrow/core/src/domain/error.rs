// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine Error Taxonomy
//!
//! Every service operation returns [`EngineError`]. The classes matter to
//! callers:
//!
//! - `Validation` / `Invariant` / `StateTransition`: rejected outright,
//!   nothing was written (the transaction rolled back).
//! - `Gateway`: the payment provider failed; the release was moved to
//!   FAILED and awaits operator action.
//! - `Conflict`: lock wait timeout or serialization failure; safe to retry
//!   the whole operation from scratch (see `application::retry`).
//!
//! Rejections carry the numbers involved so the caller can render an
//! actionable message instead of a generic failure.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::gateway::GatewayError;
use crate::domain::primitives::{ArithmeticError, Money, Percentage, UseOfFundsError};
use crate::domain::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    #[error("Payment gateway failure: {0}")]
    Gateway(#[from] GatewayError),

    /// Lock wait timeout or serialization failure. The operation saw no
    /// partial writes and can be retried from scratch.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::Conflict(reason) => EngineError::Conflict(reason),
            StoreError::Database(reason) => EngineError::Storage(reason),
            StoreError::Serialization(reason) => EngineError::Storage(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Money },

    #[error("Percentage must be positive, got {value}")]
    NonPositivePercentage { value: Percentage },

    #[error("Company valuation is undefined: available percentage is zero")]
    ValuationUndefined,

    #[error("Equity offered must be in (0, 100], got {value}%")]
    EquityOfferedOutOfRange { value: Percentage },

    #[error("Investment buys {bought}%, below the minimum of {minimum}%")]
    BelowMinimumInvestment {
        bought: Percentage,
        minimum: Percentage,
    },

    #[error("App needs at least 2 milestones to activate, found {count}")]
    TooFewMilestones { count: usize },

    #[error("Milestone release percentages must sum to 100%, got {total}%")]
    MilestonePercentageSum { total: Percentage },

    #[error("Milestone release percentage must be in (0, 100], got {value}%")]
    ReleasePercentageOutOfRange { value: Percentage },

    #[error("Progress must be between 0 and 100, got {progress}")]
    ProgressOutOfRange { progress: u8 },

    #[error("Refund percentage must be in (0, 100], got {value}%")]
    RefundPercentageOutOfRange { value: Percentage },

    #[error("Shares are locked in until {until}")]
    WithinLockInPeriod { until: DateTime<Utc> },

    #[error(transparent)]
    UseOfFunds(#[from] UseOfFundsError),
}

/// Violations of the ledger's core invariants. The whole operation is
/// rejected; nothing is partially applied.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error(
        "Allocation rejected: {requested}% would exceed the {available}% equity pool \
         ({invested}% already sold)"
    )]
    OversellRejected {
        requested: Percentage,
        invested: Percentage,
        available: Percentage,
    },

    #[error("Insufficient escrow funds: requested {requested}, available {available}")]
    InsufficientEscrowFunds { requested: Money, available: Money },

    #[error("Insufficient ownership: holds {held}%, tried to remove {requested}%")]
    InsufficientOwnership {
        held: Percentage,
        requested: Percentage,
    },
}

/// The operation is not valid for the entity's current state.
#[derive(Debug, Error)]
#[error("{entity} {id}: cannot {operation} while {state}")]
pub struct StateTransitionError {
    pub entity: &'static str,
    pub id: Uuid,
    pub operation: &'static str,
    pub state: String,
}

impl StateTransitionError {
    pub fn new(
        entity: &'static str,
        id: Uuid,
        operation: &'static str,
        state: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            id,
            operation,
            state: state.into(),
        }
    }
}
