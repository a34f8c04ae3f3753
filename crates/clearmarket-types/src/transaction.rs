//! Executed transaction records.
//!
//! A [`Transaction`] is the immutable record of one settled (bid, ask) pair.
//! For budget-balanced rules `buyer_charge == seller_payment`; for the
//! McAfee trimmed case the buyer pays more than the seller receives and the
//! auctioneer's house account keeps the difference.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OrderId, TraderId, TransactionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Deterministic from (day, round, fill sequence).
    pub id: TransactionId,
    pub day: u32,
    pub round: u32,
    pub bid_order: OrderId,
    pub ask_order: OrderId,
    pub buyer: TraderId,
    pub seller: TraderId,
    /// Unit price paid by the buyer.
    pub price: Decimal,
    /// Unit price received by the seller.
    pub seller_price: Decimal,
    /// Units exchanged; identical for both legs.
    pub quantity: u64,
    /// Total debited from the buyer.
    pub buyer_charge: Decimal,
    /// Total credited to the seller.
    pub seller_payment: Decimal,
    /// Wall-clock stamp for reporting. Not part of any digest.
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    /// Amount kept by the house: `buyer_charge - seller_payment`.
    #[must_use]
    pub fn house_margin(&self) -> Decimal {
        self.buyer_charge - self.seller_payment
    }

    #[must_use]
    pub fn is_budget_balanced(&self) -> bool {
        self.house_margin().is_zero()
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transaction[{}] {} -> {} {} @ {}",
            self.id.short(),
            self.seller,
            self.buyer,
            self.quantity,
            self.price,
        )
    }
}
