//! Supply conservation invariant checker.
//!
//! Invariant checked after settlement:
//! ```text
//! Σ(trader funds) + house funds == Σ(funds deposited)
//! Σ(trader stock)               == Σ(stock deposited)
//! ```
//!
//! Settlement only moves funds and stock between holders, so a mismatch
//! means value was created or destroyed.

use std::collections::HashMap;
use std::fmt;

use clearmarket_types::{ClearmarketError, Result, SettlementReason};
use rust_decimal::Decimal;

/// Conserved quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Supply {
    Funds,
    Stock,
}

impl fmt::Display for Supply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Funds => write!(f, "funds"),
            Self::Stock => write!(f, "stock"),
        }
    }
}

fn overflow(supply: Supply) -> ClearmarketError {
    ClearmarketError::ArithmeticOverflow(match supply {
        Supply::Funds => "funds supply",
        Supply::Stock => "stock supply",
    })
}

/// Tracks what has been put into the market.
#[derive(Debug, Clone)]
pub struct SupplyConservation {
    deposits: HashMap<Supply, Decimal>,
    /// Part of `deposits` that came from opening endowments.
    opening: HashMap<Supply, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deposits: HashMap::new(),
            opening: HashMap::new(),
        }
    }

    /// Total after depositing `amount` more of `supply`.
    ///
    /// Stock totals are capped at `u64::MAX` so that no holding and no sum
    /// of holdings can overflow.
    ///
    /// # Errors
    /// - [`ClearmarketError::InvalidSettlement`] for a negative amount
    /// - [`ClearmarketError::ArithmeticOverflow`] if the total leaves its range
    pub fn check_deposit(&self, supply: Supply, amount: Decimal) -> Result<Decimal> {
        if amount.is_sign_negative() {
            return Err(ClearmarketError::InvalidSettlement {
                reason: SettlementReason::NegativeAmount,
            });
        }
        let total = self
            .expected_supply(supply)
            .checked_add(amount)
            .ok_or_else(|| overflow(supply))?;
        if supply == Supply::Stock && total > Decimal::from(u64::MAX) {
            return Err(overflow(supply));
        }
        Ok(total)
    }

    /// # Errors
    /// As [`Self::check_deposit`]; nothing is recorded on failure.
    pub fn record_deposit(&mut self, supply: Supply, amount: Decimal) -> Result<()> {
        let total = self.check_deposit(supply, amount)?;
        self.deposits.insert(supply, total);
        Ok(())
    }

    /// Record an opening endowment, which survives [`Self::reset`].
    ///
    /// # Errors
    /// As [`Self::check_deposit`]; nothing is recorded on failure.
    pub fn record_opening(&mut self, supply: Supply, amount: Decimal) -> Result<()> {
        let total = self.check_deposit(supply, amount)?;
        let opening = self
            .opening
            .get(&supply)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .checked_add(amount)
            .ok_or_else(|| overflow(supply))?;
        self.deposits.insert(supply, total);
        self.opening.insert(supply, opening);
        Ok(())
    }

    /// Total that should exist across all holders.
    #[must_use]
    pub fn expected_supply(&self, supply: Supply) -> Decimal {
        self.deposits.get(&supply).copied().unwrap_or(Decimal::ZERO)
    }

    /// # Errors
    /// [`ClearmarketError::SupplyInvariantViolation`] if `actual_supply`
    /// differs from what was deposited.
    pub fn verify(&self, supply: Supply, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(supply);
        if actual_supply != expected {
            return Err(ClearmarketError::SupplyInvariantViolation {
                reason: format!("{supply}: actual supply {actual_supply} != deposited {expected}"),
            });
        }
        Ok(())
    }

    /// Forget every deposit except the opening endowments.
    pub fn reset(&mut self) {
        self.deposits.clone_from(&self.opening);
    }
}

impl Default for SupplyConservation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_supply_is_zero() {
        let sc = SupplyConservation::new();
        assert_eq!(sc.expected_supply(Supply::Funds), Decimal::ZERO);
        assert!(sc.verify(Supply::Stock, Decimal::ZERO).is_ok());
    }

    #[test]
    fn deposits_accumulate_per_supply() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(Supply::Funds, Decimal::new(1000, 0)).unwrap();
        sc.record_deposit(Supply::Funds, Decimal::new(500, 0)).unwrap();
        sc.record_deposit(Supply::Stock, Decimal::new(7, 0)).unwrap();
        assert_eq!(sc.expected_supply(Supply::Funds), Decimal::new(1500, 0));
        assert_eq!(sc.expected_supply(Supply::Stock), Decimal::new(7, 0));
    }

    #[test]
    fn verify_fails_when_imbalanced() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(Supply::Stock, Decimal::new(10, 0)).unwrap();
        let err = sc.verify(Supply::Stock, Decimal::new(11, 0)).unwrap_err();
        assert!(matches!(err, ClearmarketError::SupplyInvariantViolation { .. }));
        assert!(err.to_string().contains("stock"));
    }

    #[test]
    fn reset_keeps_only_openings() {
        let mut sc = SupplyConservation::new();
        sc.record_opening(Supply::Funds, Decimal::TEN).unwrap();
        sc.record_deposit(Supply::Funds, Decimal::ONE).unwrap();
        assert_eq!(sc.expected_supply(Supply::Funds), Decimal::new(11, 0));
        sc.reset();
        assert_eq!(sc.expected_supply(Supply::Funds), Decimal::TEN);
    }

    #[test]
    fn out_of_range_deposits_rejected() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(Supply::Funds, Decimal::MAX).unwrap();
        assert!(matches!(
            sc.record_deposit(Supply::Funds, Decimal::ONE),
            Err(ClearmarketError::ArithmeticOverflow(_))
        ));
        assert_eq!(sc.expected_supply(Supply::Funds), Decimal::MAX);

        sc.record_deposit(Supply::Stock, Decimal::from(u64::MAX)).unwrap();
        assert!(sc.record_deposit(Supply::Stock, Decimal::ONE).is_err());
        assert!(sc.record_deposit(Supply::Stock, Decimal::NEGATIVE_ONE).is_err());
    }
}
