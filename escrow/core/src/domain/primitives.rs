// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger Primitives
//!
//! Fixed-point value objects for all money and percentage arithmetic.
//!
//! # Architecture
//!
//! - **Layer:** Domain (value objects)
//! - **Rounding:** round-half-up to 2 decimal places, applied at construction
//!   and after every multiplying/dividing operation
//! - **Comparisons:** exact, no epsilon tolerance
//! - **Floating point is never used** for these quantities
//!
//! Division by a zero divisor fails with [`ArithmeticError::DivisionByZero`];
//! there is no infinity or NaN in this arithmetic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scale shared by money and percentage values.
const LEDGER_SCALE: u32 = 2;

fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(LEDGER_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArithmeticError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Decimal overflow")]
    Overflow,
}

/// Monetary amount with two decimal places.
///
/// Negative values are representable (subtraction is closed) but every ledger
/// entry amount is validated positive at the service boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(quantize(value))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn checked_add(self, other: Money) -> Result<Money, ArithmeticError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, ArithmeticError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(ArithmeticError::Overflow)
    }

    /// Multiplies by an arbitrary decimal factor, rounding the result.
    pub fn checked_mul(self, factor: Decimal) -> Result<Money, ArithmeticError> {
        self.0
            .checked_mul(factor)
            .map(|v| Money::new(v))
            .ok_or(ArithmeticError::Overflow)
    }

    /// Saturating addition, used only by balance folds where the inputs are
    /// already-validated ledger amounts.
    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction, counterpart of [`Money::saturating_add`].
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// `self * pct / 100`, rounded. Sizes milestone payouts and fees.
    pub fn percent_of(self, pct: Percentage) -> Result<Money, ArithmeticError> {
        let raw = self
            .0
            .checked_mul(pct.value())
            .ok_or(ArithmeticError::Overflow)?
            .checked_div(Decimal::ONE_HUNDRED)
            .ok_or(ArithmeticError::DivisionByZero)?;
        Ok(Money::new(raw))
    }

    /// `self / valuation * 100` as a percentage, rounded.
    ///
    /// This is the allocation formula: the share of a company a payment buys
    /// at the given valuation.
    pub fn share_of(self, valuation: Money) -> Result<Percentage, ArithmeticError> {
        let ratio = self
            .0
            .checked_div(valuation.0)
            .ok_or(ArithmeticError::DivisionByZero)?;
        let raw = ratio
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(ArithmeticError::Overflow)?;
        Ok(Percentage::new(raw))
    }

    /// Amount in minor units (e.g. kobo, cents) for gateway payloads.
    pub fn to_minor_units(&self) -> Option<i64> {
        self.0.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
    }

    pub fn from_minor_units(minor: i64) -> Self {
        Money(Decimal::new(minor, LEDGER_SCALE))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Money::new)
    }
}

/// Equity percentage with two decimal places.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);
    pub const HUNDRED: Percentage = Percentage(Decimal::ONE_HUNDRED);

    pub fn new(value: Decimal) -> Self {
        Self(quantize(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn checked_add(self, other: Percentage) -> Result<Percentage, ArithmeticError> {
        self.0
            .checked_add(other.0)
            .map(Percentage)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn checked_sub(self, other: Percentage) -> Result<Percentage, ArithmeticError> {
        self.0
            .checked_sub(other.0)
            .map(Percentage)
            .ok_or(ArithmeticError::Overflow)
    }

    /// Saturating addition for percentage folds.
    pub fn saturating_add(self, other: Percentage) -> Percentage {
        Percentage(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Percentage {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Percentage::new)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UseOfFundsError {
    #[error("Use-of-funds category must not be empty")]
    EmptyCategory,
    #[error("Use-of-funds share for '{category}' must be positive, got {share}")]
    NonPositiveShare { category: String, share: Percentage },
    #[error("Use-of-funds shares must sum to 100%, got {total}%")]
    SumNot100 { total: Percentage },
}

/// Declared breakdown of how raised funds will be spent.
///
/// A tagged record of category → percentage. Empty means "not declared";
/// a non-empty breakdown must sum to exactly 100%.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UseOfFunds(BTreeMap<String, Percentage>);

impl UseOfFunds {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn try_new(
        entries: BTreeMap<String, Percentage>,
    ) -> Result<Self, UseOfFundsError> {
        if entries.is_empty() {
            return Ok(Self(entries));
        }
        let mut total = Percentage::ZERO;
        for (category, share) in &entries {
            if category.trim().is_empty() {
                return Err(UseOfFundsError::EmptyCategory);
            }
            if !share.is_positive() {
                return Err(UseOfFundsError::NonPositiveShare {
                    category: category.clone(),
                    share: *share,
                });
            }
            total = total.saturating_add(*share);
        }
        if total != Percentage::HUNDRED {
            return Err(UseOfFundsError::SumNot100 { total });
        }
        Ok(Self(entries))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn share(&self, category: &str) -> Option<Percentage> {
        self.0.get(category).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Percentage)> {
        self.0.iter()
    }
}
