//! Atomic settlement of cleared pairs.
//!
//! [`Ledger::settle`] checks every precondition before touching any balance:
//! either the whole transfer (stock one way, funds the other, house margin)
//! commits, or nothing changes.

use std::collections::HashMap;

use clearmarket_types::{ClearmarketError, Order, Result, SettlementReason, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::{Account, CommodityHolding};
use crate::supply_conservation::{Supply, SupplyConservation};

/// Funds and stock of one trader.
#[derive(Debug, Clone)]
struct Entry {
    account: Account,
    holding: CommodityHolding,
    opening_funds: Decimal,
    opening_stock: u64,
}

/// Record of one applied settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position in the ledger's settlement log, starting at 0.
    pub sequence: u64,
    pub buyer: TraderId,
    pub seller: TraderId,
    pub quantity: u64,
    pub buyer_charge: Decimal,
    pub seller_payment: Decimal,
    /// `buyer_charge - seller_payment`, credited to the house.
    pub house_delta: Decimal,
}

/// Accounts and holdings of every trader plus the house account.
#[derive(Debug, Clone)]
pub struct Ledger {
    traders: HashMap<TraderId, Entry>,
    house: Account,
    supply: SupplyConservation,
    settlements: u64,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            traders: HashMap::new(),
            house: Account::house(),
            supply: SupplyConservation::new(),
            settlements: 0,
        }
    }

    /// Open an account and holding with an opening endowment.
    ///
    /// # Errors
    /// - [`ClearmarketError::DuplicateTrader`] if `trader` already has one
    /// - [`ClearmarketError::InvalidSettlement`] for negative funds
    /// - [`ClearmarketError::ArithmeticOverflow`] if the market's total
    ///   funds or stock would leave their range
    pub fn open_account(&mut self, trader: TraderId, funds: Decimal, stock: u64) -> Result<()> {
        if self.traders.contains_key(&trader) || trader == TraderId::HOUSE {
            return Err(ClearmarketError::DuplicateTrader(trader));
        }
        self.supply.check_deposit(Supply::Funds, funds)?;
        self.supply.check_deposit(Supply::Stock, Decimal::from(stock))?;
        self.supply.record_opening(Supply::Funds, funds)?;
        self.supply.record_opening(Supply::Stock, Decimal::from(stock))?;
        self.traders.insert(
            trader,
            Entry {
                account: Account::new(trader, funds),
                holding: CommodityHolding::new(trader, stock),
                opening_funds: funds,
                opening_stock: stock,
            },
        );
        tracing::debug!(trader = %trader, funds = %funds, stock, "Account opened");
        Ok(())
    }

    /// Add funds to an existing account.
    ///
    /// # Errors
    /// [`ClearmarketError::UnknownTrader`], or as [`Self::open_account`].
    pub fn deposit_funds(&mut self, trader: TraderId, amount: Decimal) -> Result<()> {
        let mut account = self.entry(trader)?.account.clone();
        account.credit(amount)?;
        self.supply.record_deposit(Supply::Funds, amount)?;
        self.entry_mut(trader)?.account = account;
        Ok(())
    }

    /// Add stock to an existing holding.
    ///
    /// # Errors
    /// [`ClearmarketError::UnknownTrader`], or as [`Self::open_account`].
    pub fn deposit_stock(&mut self, trader: TraderId, quantity: u64) -> Result<()> {
        let mut holding = self.entry(trader)?.holding.clone();
        holding.give(quantity)?;
        self.supply.record_deposit(Supply::Stock, Decimal::from(quantity))?;
        self.entry_mut(trader)?.holding = holding;
        Ok(())
    }

    fn entry(&self, trader: TraderId) -> Result<&Entry> {
        self.traders
            .get(&trader)
            .ok_or(ClearmarketError::UnknownTrader(trader))
    }

    fn entry_mut(&mut self, trader: TraderId) -> Result<&mut Entry> {
        self.traders
            .get_mut(&trader)
            .ok_or(ClearmarketError::UnknownTrader(trader))
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Settle `quantity` units between the owners of `ask` and `bid`.
    ///
    /// Effects: seller stock `-= quantity`, buyer stock `+= quantity`,
    /// buyer funds `-= buyer_charge`, seller funds `+= seller_payment`,
    /// house funds `+= buyer_charge - seller_payment`.
    ///
    /// # Errors
    /// - [`ClearmarketError::InvalidSettlement`] for wrong sides, zero
    ///   quantity, a self-trade or a negative amount
    /// - [`ClearmarketError::UnknownTrader`] if either trader has no ledger
    /// - [`ClearmarketError::InsufficientStock`] / [`ClearmarketError::InsufficientFunds`]
    /// - [`ClearmarketError::ArithmeticOverflow`] if a resulting balance
    ///   would leave its range
    ///
    /// Nothing is applied when any of these is returned.
    pub fn settle(
        &mut self,
        ask: &Order,
        bid: &Order,
        buyer_charge: Decimal,
        seller_payment: Decimal,
        quantity: u64,
    ) -> Result<Receipt> {
        let invalid = |reason| ClearmarketError::InvalidSettlement { reason };
        if !ask.is_ask() {
            return Err(invalid(SettlementReason::NotAnAsk));
        }
        if !bid.is_bid() {
            return Err(invalid(SettlementReason::NotABid));
        }
        if quantity == 0 {
            return Err(invalid(SettlementReason::ZeroQuantity));
        }
        if ask.trader == bid.trader {
            return Err(invalid(SettlementReason::SelfTrade));
        }
        if buyer_charge.is_sign_negative() || seller_payment.is_sign_negative() {
            return Err(invalid(SettlementReason::NegativeAmount));
        }

        let seller = self.entry(ask.trader)?;
        let buyer = self.entry(bid.trader)?;
        if seller.holding.quantity() < quantity {
            return Err(ClearmarketError::InsufficientStock {
                trader: ask.trader,
                needed: quantity,
                available: seller.holding.quantity(),
            });
        }
        if !buyer.account.can_debit(buyer_charge) {
            return Err(ClearmarketError::InsufficientFunds {
                trader: bid.trader,
                needed: buyer_charge,
                available: buyer.account.funds(),
            });
        }
        let overflow = ClearmarketError::ArithmeticOverflow;
        buyer
            .holding
            .quantity()
            .checked_add(quantity)
            .ok_or(overflow("buyer stock"))?;
        seller
            .account
            .funds()
            .checked_add(seller_payment)
            .ok_or(overflow("seller funds"))?;
        let house_delta = buyer_charge
            .checked_sub(seller_payment)
            .ok_or(overflow("house margin"))?;
        self.house
            .funds()
            .checked_add(house_delta)
            .ok_or(overflow("house funds"))?;

        // All checks passed; the calls below cannot fail.
        self.entry_mut(ask.trader)?.holding.take(quantity)?;
        self.entry_mut(bid.trader)?.holding.give(quantity)?;
        self.entry_mut(bid.trader)?.account.debit(buyer_charge)?;
        self.entry_mut(ask.trader)?.account.credit(seller_payment)?;
        if house_delta.is_sign_negative() {
            self.house.debit(-house_delta)?;
        } else {
            self.house.credit(house_delta)?;
        }

        let receipt = Receipt {
            sequence: self.settlements,
            buyer: bid.trader,
            seller: ask.trader,
            quantity,
            buyer_charge,
            seller_payment,
            house_delta,
        };
        self.settlements += 1;

        tracing::debug!(
            buyer = %receipt.buyer,
            seller = %receipt.seller,
            qty = quantity,
            charge = %buyer_charge,
            payment = %seller_payment,
            "Settled"
        );
        Ok(receipt)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// # Errors
    /// [`ClearmarketError::UnknownTrader`].
    pub fn account(&self, trader: TraderId) -> Result<&Account> {
        Ok(&self.entry(trader)?.account)
    }

    /// # Errors
    /// [`ClearmarketError::UnknownTrader`].
    pub fn holding(&self, trader: TraderId) -> Result<&CommodityHolding> {
        Ok(&self.entry(trader)?.holding)
    }

    /// Stock held by `trader`, zero if unknown.
    #[must_use]
    pub fn stock_of(&self, trader: TraderId) -> u64 {
        self.traders.get(&trader).map_or(0, |e| e.holding.quantity())
    }

    /// The auctioneer's clearing account.
    #[must_use]
    pub fn house(&self) -> &Account {
        &self.house
    }

    #[must_use]
    pub fn contains_trader(&self, trader: TraderId) -> bool {
        self.traders.contains_key(&trader)
    }

    #[must_use]
    pub fn trader_count(&self) -> usize {
        self.traders.len()
    }

    #[must_use]
    pub fn settlement_count(&self) -> u64 {
        self.settlements
    }

    /// Funds across all traders and the house.
    ///
    /// # Errors
    /// [`ClearmarketError::ArithmeticOverflow`] if the sum leaves the
    /// `Decimal` range.
    pub fn total_funds(&self) -> Result<Decimal> {
        self.traders
            .values()
            .map(|e| e.account.funds())
            .try_fold(self.house.funds(), Decimal::checked_add)
            .ok_or(ClearmarketError::ArithmeticOverflow("total funds"))
    }

    /// Stock across all traders.
    ///
    /// # Errors
    /// [`ClearmarketError::ArithmeticOverflow`] past `u64::MAX` units.
    pub fn total_stock(&self) -> Result<u64> {
        self.traders
            .values()
            .map(|e| e.holding.quantity())
            .try_fold(0u64, u64::checked_add)
            .ok_or(ClearmarketError::ArithmeticOverflow("total stock"))
    }

    /// Check funds and stock against everything deposited.
    ///
    /// # Errors
    /// [`ClearmarketError::SupplyInvariantViolation`].
    pub fn verify_conservation(&self) -> Result<()> {
        self.supply.verify(Supply::Funds, self.total_funds()?)?;
        self.supply
            .verify(Supply::Stock, Decimal::from(self.total_stock()?))
    }

    /// Restore every trader to their opening endowment and empty the house.
    /// Later deposits are discarded.
    pub fn reset(&mut self) {
        self.supply.reset();
        for (trader, entry) in &mut self.traders {
            entry.account = Account::new(*trader, entry.opening_funds);
            entry.holding = CommodityHolding::new(*trader, entry.opening_stock);
        }
        self.house = Account::house();
        self.settlements = 0;
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use clearmarket_types::OrderSide;

    use super::*;

    const BUYER: TraderId = TraderId(1);
    const SELLER: TraderId = TraderId(2);

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn bid() -> Order {
        Order::dummy_for_trader(BUYER, OrderSide::Bid, dec(12), 5, 1)
    }

    fn ask() -> Order {
        Order::dummy_for_trader(SELLER, OrderSide::Ask, dec(10), 5, 2)
    }

    fn ledger() -> Ledger {
        let mut l = Ledger::new();
        l.open_account(BUYER, dec(100), 0).unwrap();
        l.open_account(SELLER, dec(0), 5).unwrap();
        l
    }

    fn snapshot(l: &Ledger) -> (Decimal, Decimal, Decimal, u64, u64) {
        (
            l.account(BUYER).unwrap().funds(),
            l.account(SELLER).unwrap().funds(),
            l.house().funds(),
            l.stock_of(BUYER),
            l.stock_of(SELLER),
        )
    }

    #[test]
    fn balanced_settlement_moves_stock_and_funds() {
        let mut l = ledger();
        let receipt = l.settle(&ask(), &bid(), dec(33), dec(33), 3).unwrap();
        assert_eq!(receipt.sequence, 0);
        assert_eq!(receipt.house_delta, Decimal::ZERO);
        assert_eq!(snapshot(&l), (dec(67), dec(33), dec(0), 3, 2));
        l.verify_conservation().unwrap();
    }

    #[test]
    fn house_absorbs_margin() {
        let mut l = ledger();
        let receipt = l.settle(&ask(), &bid(), dec(24), dec(20), 2).unwrap();
        assert_eq!(receipt.house_delta, dec(4));
        assert_eq!(l.house().funds(), dec(4));
        l.verify_conservation().unwrap();
    }

    #[test]
    fn house_can_subsidise() {
        let mut l = ledger();
        l.settle(&ask(), &bid(), dec(20), dec(24), 2).unwrap();
        assert_eq!(l.house().funds(), dec(-4));
        l.verify_conservation().unwrap();
    }

    #[test]
    fn wrong_sides_rejected() {
        let mut l = ledger();
        let err = l.settle(&bid(), &bid(), dec(1), dec(1), 1).unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidSettlement { reason: SettlementReason::NotAnAsk }
        ));
        let err = l.settle(&ask(), &ask(), dec(1), dec(1), 1).unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidSettlement { reason: SettlementReason::NotABid }
        ));
    }

    #[test]
    fn zero_quantity_and_self_trade_rejected() {
        let mut l = ledger();
        assert!(l.settle(&ask(), &bid(), dec(0), dec(0), 0).is_err());
        let own_bid = Order::dummy_for_trader(SELLER, OrderSide::Bid, dec(12), 1, 3);
        let err = l.settle(&ask(), &own_bid, dec(1), dec(1), 1).unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidSettlement { reason: SettlementReason::SelfTrade }
        ));
    }

    #[test]
    fn failed_precondition_leaves_ledger_untouched() {
        let mut l = ledger();
        let before = snapshot(&l);

        let err = l.settle(&ask(), &bid(), dec(60), dec(60), 6).unwrap_err();
        assert!(matches!(err, ClearmarketError::InsufficientStock { .. }));
        assert_eq!(snapshot(&l), before);

        let err = l.settle(&ask(), &bid(), dec(101), dec(101), 1).unwrap_err();
        assert!(matches!(err, ClearmarketError::InsufficientFunds { .. }));
        assert_eq!(snapshot(&l), before);

        let err = l.settle(&ask(), &bid(), dec(-1), dec(1), 1).unwrap_err();
        assert!(matches!(err, ClearmarketError::InvalidSettlement { .. }));
        assert_eq!(snapshot(&l), before);
        assert_eq!(l.settlement_count(), 0);
    }

    #[test]
    fn unknown_trader_rejected() {
        let mut l = ledger();
        let stranger = Order::dummy_for_trader(TraderId(9), OrderSide::Bid, dec(12), 1, 4);
        let err = l.settle(&ask(), &stranger, dec(1), dec(1), 1).unwrap_err();
        assert!(matches!(err, ClearmarketError::UnknownTrader(TraderId(9))));
    }

    #[test]
    fn duplicate_account_rejected() {
        let mut l = ledger();
        assert!(matches!(
            l.open_account(BUYER, dec(1), 1),
            Err(ClearmarketError::DuplicateTrader(_))
        ));
        assert!(l.open_account(TraderId::HOUSE, dec(1), 1).is_err());
        assert_eq!(l.trader_count(), 2);
    }

    #[test]
    fn deposits_are_tracked() {
        let mut l = ledger();
        l.deposit_funds(SELLER, dec(10)).unwrap();
        l.deposit_stock(BUYER, 4).unwrap();
        assert_eq!(l.total_funds().unwrap(), dec(110));
        assert_eq!(l.total_stock().unwrap(), 9);
        l.verify_conservation().unwrap();
        assert!(l.deposit_funds(TraderId(42), dec(1)).is_err());
    }

    #[test]
    fn out_of_range_endowments_rejected() {
        let mut l = ledger();
        let err = l.open_account(TraderId(3), Decimal::MAX, 0).unwrap_err();
        assert!(matches!(err, ClearmarketError::ArithmeticOverflow(_)));
        assert!(!l.contains_trader(TraderId(3)));

        assert!(l.open_account(TraderId(4), dec(0), u64::MAX).is_err());
        assert!(l.open_account(TraderId(5), dec(-1), 0).is_err());
        assert!(l.deposit_stock(SELLER, u64::MAX).is_err());
        assert_eq!(l.stock_of(SELLER), 5);
        assert_eq!(l.trader_count(), 2);
        l.verify_conservation().unwrap();
    }

    #[test]
    fn overflowing_payment_rejected_without_side_effects() {
        let mut l = Ledger::new();
        l.open_account(BUYER, dec(0), 0).unwrap();
        l.open_account(SELLER, dec(10), 5).unwrap();
        // Seller funds would leave the Decimal range.
        let err = l
            .settle(&ask(), &bid(), dec(0), Decimal::MAX, 1)
            .unwrap_err();
        assert!(matches!(err, ClearmarketError::ArithmeticOverflow(_)));
        assert_eq!(l.settlement_count(), 0);
        assert_eq!(l.stock_of(SELLER), 5);
        l.verify_conservation().unwrap();
    }

    #[test]
    fn reset_restores_endowments() {
        let mut l = ledger();
        let before = snapshot(&l);
        l.settle(&ask(), &bid(), dec(24), dec(20), 2).unwrap();
        l.deposit_funds(BUYER, dec(5)).unwrap();
        l.reset();
        assert_eq!(snapshot(&l), before);
        assert_eq!(l.settlement_count(), 0);
        l.verify_conservation().unwrap();
    }

    #[test]
    fn receipt_serde_roundtrip() {
        let mut l = ledger();
        let receipt = l.settle(&ask(), &bid(), dec(11), dec(11), 1).unwrap();
        let json = serde_json::to_string(&receipt).unwrap();
        let back: Receipt = serde_json::from_str(&json).unwrap();
        assert_eq!(receipt, back);
    }
}
