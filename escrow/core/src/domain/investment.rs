use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::InvariantViolation;
use crate::domain::ids::{AppId, InvestmentId, UserId};
use crate::domain::primitives::{ArithmeticError, Money, Percentage};

/// Immutable record of one equity purchase. Created only by the allocator;
/// never updated. A refund removes the row and compensates ownership and the
/// ledger instead of editing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub investor: UserId,
    pub app: AppId,
    pub amount_paid: Money,
    pub percentage_bought: Percentage,
    pub created_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(
        investor: UserId,
        app: AppId,
        amount_paid: Money,
        percentage_bought: Percentage,
    ) -> Self {
        Self {
            id: InvestmentId::new(),
            investor,
            app,
            amount_paid,
            percentage_bought,
            created_at: Utc::now(),
        }
    }
}

/// Mutable ownership aggregate per (investor, app). Created lazily on first
/// investment; moved only by investment creation/refund and completed share
/// transfers, always inside the triggering operation's transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareOwnership {
    pub investor: UserId,
    pub app: AppId,
    pub percentage_owned: Percentage,
    pub updated_at: DateTime<Utc>,
}

impl ShareOwnership {
    pub fn new(investor: UserId, app: AppId) -> Self {
        Self {
            investor,
            app,
            percentage_owned: Percentage::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn increase(&mut self, pct: Percentage) -> Result<(), ArithmeticError> {
        self.percentage_owned = self.percentage_owned.checked_add(pct)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn decrease(&mut self, pct: Percentage) -> Result<(), InvariantViolation> {
        if pct > self.percentage_owned {
            return Err(InvariantViolation::InsufficientOwnership {
                held: self.percentage_owned,
                requested: pct,
            });
        }
        self.percentage_owned = self
            .percentage_owned
            .checked_sub(pct)
            .map_err(|_| InvariantViolation::InsufficientOwnership {
                held: self.percentage_owned,
                requested: pct,
            })?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_decrease_cannot_underflow() {
        let mut ownership = ShareOwnership::new(UserId::new(), AppId::new());
        ownership.increase("5.00".parse().unwrap()).unwrap();

        let err = ownership.decrease("5.01".parse().unwrap()).unwrap_err();
        assert!(matches!(err, InvariantViolation::InsufficientOwnership { .. }));

        ownership.decrease("5.00".parse().unwrap()).unwrap();
        assert!(ownership.percentage_owned.is_zero());
    }
}
