//! Per-participant funds accounts and commodity holdings.
//!
//! Both are only changed through `credit`/`debit` (`give`/`take`) and the
//! paired `transfer`, so value moves between holders instead of appearing.

use clearmarket_types::{ClearmarketError, Result, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether an account may go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccountKind {
    /// Funds never go negative.
    #[default]
    Standard,
    /// May run a negative balance. Used for the auctioneer's clearing
    /// account, which absorbs budget imbalance.
    ZeroFunds,
}

/// Funds account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: TraderId,
    funds: Decimal,
    kind: AccountKind,
}

impl Account {
    #[must_use]
    pub fn new(owner: TraderId, funds: Decimal) -> Self {
        Self {
            owner,
            funds,
            kind: AccountKind::Standard,
        }
    }

    /// The auctioneer's clearing account, starting at zero.
    #[must_use]
    pub fn house() -> Self {
        Self {
            owner: TraderId::HOUSE,
            funds: Decimal::ZERO,
            kind: AccountKind::ZeroFunds,
        }
    }

    #[must_use]
    pub fn funds(&self) -> Decimal {
        self.funds
    }

    #[must_use]
    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    /// Whether `amount` could be debited right now.
    #[must_use]
    pub fn can_debit(&self, amount: Decimal) -> bool {
        self.kind == AccountKind::ZeroFunds || self.funds >= amount
    }

    /// # Errors
    /// [`ClearmarketError::ArithmeticOverflow`] if the balance would leave
    /// the `Decimal` range. The balance is unchanged.
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        self.funds = self
            .funds
            .checked_add(amount)
            .ok_or(ClearmarketError::ArithmeticOverflow("account credit"))?;
        Ok(())
    }

    /// # Errors
    /// [`ClearmarketError::InsufficientFunds`] if a standard account would
    /// go negative, [`ClearmarketError::ArithmeticOverflow`] if a zero-funds
    /// account would leave the `Decimal` range. The balance is unchanged.
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        if !self.can_debit(amount) {
            return Err(ClearmarketError::InsufficientFunds {
                trader: self.owner,
                needed: amount,
                available: self.funds,
            });
        }
        self.funds = self
            .funds
            .checked_sub(amount)
            .ok_or(ClearmarketError::ArithmeticOverflow("account debit"))?;
        Ok(())
    }

    /// Move `amount` from this account to `to`.
    ///
    /// # Errors
    /// As [`Self::debit`] and [`Self::credit`]; neither account changes on
    /// failure.
    pub fn transfer(&mut self, to: &mut Self, amount: Decimal) -> Result<()> {
        let credited = to
            .funds
            .checked_add(amount)
            .ok_or(ClearmarketError::ArithmeticOverflow("account credit"))?;
        self.debit(amount)?;
        to.funds = credited;
        Ok(())
    }
}

/// Integer stock of the traded commodity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommodityHolding {
    pub owner: TraderId,
    quantity: u64,
}

impl CommodityHolding {
    #[must_use]
    pub fn new(owner: TraderId, quantity: u64) -> Self {
        Self { owner, quantity }
    }

    #[must_use]
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// # Errors
    /// [`ClearmarketError::ArithmeticOverflow`] past `u64::MAX` units.
    pub fn give(&mut self, quantity: u64) -> Result<()> {
        self.quantity = self
            .quantity
            .checked_add(quantity)
            .ok_or(ClearmarketError::ArithmeticOverflow("stock holding"))?;
        Ok(())
    }

    /// # Errors
    /// [`ClearmarketError::InsufficientStock`] if fewer than `quantity` units
    /// are held.
    pub fn take(&mut self, quantity: u64) -> Result<()> {
        if self.quantity < quantity {
            return Err(ClearmarketError::InsufficientStock {
                trader: self.owner,
                needed: quantity,
                available: self.quantity,
            });
        }
        self.quantity -= quantity;
        Ok(())
    }

    /// Move `quantity` units from this holding to `to`.
    ///
    /// # Errors
    /// As [`Self::take`] and [`Self::give`]; neither holding changes on
    /// failure.
    pub fn transfer(&mut self, to: &mut Self, quantity: u64) -> Result<()> {
        let received = to
            .quantity
            .checked_add(quantity)
            .ok_or(ClearmarketError::ArithmeticOverflow("stock holding"))?;
        self.take(quantity)?;
        to.quantity = received;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn standard_account_cannot_overdraw() {
        let mut acct = Account::new(TraderId(1), dec(50));
        let err = acct.debit(dec(51)).unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InsufficientFunds { trader: TraderId(1), .. }
        ));
        assert_eq!(acct.funds(), dec(50));
        acct.debit(dec(50)).unwrap();
        assert_eq!(acct.funds(), Decimal::ZERO);
    }

    #[test]
    fn house_account_may_go_negative() {
        let mut house = Account::house();
        assert_eq!(house.kind(), AccountKind::ZeroFunds);
        assert_eq!(house.owner, TraderId::HOUSE);
        house.debit(dec(7)).unwrap();
        assert_eq!(house.funds(), dec(-7));
    }

    #[test]
    fn transfer_conserves_funds() {
        let mut a = Account::new(TraderId(1), dec(100));
        let mut b = Account::new(TraderId(2), dec(10));
        a.transfer(&mut b, dec(40)).unwrap();
        assert_eq!(a.funds() + b.funds(), dec(110));
        assert_eq!(b.funds(), dec(50));

        assert!(b.transfer(&mut a, dec(500)).is_err());
        assert_eq!(a.funds(), dec(60));
        assert_eq!(b.funds(), dec(50));
    }

    #[test]
    fn holding_take_and_transfer() {
        let mut seller = CommodityHolding::new(TraderId(1), 5);
        let mut buyer = CommodityHolding::new(TraderId(2), 0);
        seller.transfer(&mut buyer, 3).unwrap();
        assert_eq!(seller.quantity(), 2);
        assert_eq!(buyer.quantity(), 3);

        let err = seller.take(3).unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InsufficientStock { needed: 3, available: 2, .. }
        ));
        assert_eq!(seller.quantity(), 2);
    }

    #[test]
    fn overflowing_credit_and_give_rejected() {
        let mut rich = Account::new(TraderId(1), Decimal::MAX);
        let err = rich.credit(Decimal::ONE).unwrap_err();
        assert!(matches!(err, ClearmarketError::ArithmeticOverflow(_)));
        assert_eq!(rich.funds(), Decimal::MAX);

        let mut payer = Account::new(TraderId(2), dec(10));
        assert!(payer.transfer(&mut rich, dec(5)).is_err());
        assert_eq!(payer.funds(), dec(10));

        let mut full = CommodityHolding::new(TraderId(3), u64::MAX);
        assert!(full.give(1).is_err());
        let mut seller = CommodityHolding::new(TraderId(4), 2);
        assert!(seller.transfer(&mut full, 1).is_err());
        assert_eq!(seller.quantity(), 2);
        assert_eq!(full.quantity(), u64::MAX);
    }

    #[test]
    fn account_serde_roundtrip() {
        let acct = Account::new(TraderId(4), Decimal::new(12345, 2));
        let json = serde_json::to_string(&acct).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(acct, back);
    }
}
