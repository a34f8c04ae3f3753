//! Order (shout) types.
//!
//! Participants submit an [`OrderRequest`] carrying a raw `f64` price.
//! The auctioneer validates it and turns it into an [`Order`] with an exact
//! decimal price and an arrival sequence; only [`Order`]s ever enter the book.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::constants::PRICE_PRECISION;
use crate::{ClearmarketError, InvalidOrderReason, OrderId, Result, TraderId};

/// Which side of the book an order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy intent.
    Bid,
    /// Sell intent.
    Ask,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "BID"),
            Self::Ask => write!(f, "ASK"),
        }
    }
}

/// An order as submitted by a participant, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: OrderId,
    pub trader: TraderId,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: u64,
}

impl OrderRequest {
    #[must_use]
    pub fn bid(id: OrderId, trader: TraderId, price: f64, quantity: u64) -> Self {
        Self {
            id,
            trader,
            side: OrderSide::Bid,
            price,
            quantity,
        }
    }

    #[must_use]
    pub fn ask(id: OrderId, trader: TraderId, price: f64, quantity: u64) -> Self {
        Self {
            id,
            trader,
            side: OrderSide::Ask,
            price,
            quantity,
        }
    }

    /// Check quantity and price, returning the exact decimal price.
    ///
    /// # Errors
    /// [`ClearmarketError::InvalidOrder`] for a zero quantity, a NaN,
    /// infinite, negative or unrepresentable price, or a notional value
    /// (`price * quantity`) that does not fit in a `Decimal`.
    pub fn validate(&self) -> Result<Decimal> {
        let reject = |reason| ClearmarketError::InvalidOrder {
            order: self.id,
            reason,
        };
        if self.quantity == 0 {
            return Err(reject(InvalidOrderReason::ZeroQuantity));
        }
        if self.price.is_nan() {
            return Err(reject(InvalidOrderReason::NanPrice));
        }
        if self.price.is_infinite() {
            return Err(reject(InvalidOrderReason::InfinitePrice));
        }
        if self.price < 0.0 {
            return Err(reject(InvalidOrderReason::NegativePrice));
        }
        let price = Decimal::from_f64(self.price)
            .ok_or(reject(InvalidOrderReason::PriceOutOfRange))?
            .round_dp(PRICE_PRECISION);
        if price.checked_mul(Decimal::from(self.quantity)).is_none() {
            return Err(reject(InvalidOrderReason::NotionalOverflow));
        }
        Ok(price)
    }

    /// Validate and stamp the request with its arrival sequence.
    pub fn into_order(self, sequence: u64) -> Result<Order> {
        let price = self.validate()?;
        Ok(Order {
            id: self.id,
            trader: self.trader,
            side: self.side,
            price,
            quantity: self.quantity,
            sequence,
        })
    }
}

/// A validated order owned by the order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub trader: TraderId,
    pub side: OrderSide,
    /// Limit price; finite and non-negative by construction.
    pub price: Decimal,
    /// Units still outstanding in the book.
    pub quantity: u64,
    /// Arrival stamp. Lower means earlier, and earlier wins price ties.
    pub sequence: u64,
}

impl Order {
    #[must_use]
    pub fn is_bid(&self) -> bool {
        self.side == OrderSide::Bid
    }

    #[must_use]
    pub fn is_ask(&self) -> bool {
        self.side == OrderSide::Ask
    }

    /// Value of `quantity` units at this order's limit price; `None` if it
    /// does not fit in a `Decimal`.
    #[must_use]
    pub fn notional(&self, quantity: u64) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(quantity))
    }

    /// Copy of this order restricted to `quantity` units.
    #[must_use]
    pub fn with_quantity(&self, quantity: u64) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    /// Order with id and sequence both set to `seq` and trader `seq`.
    pub fn dummy(side: OrderSide, price: Decimal, quantity: u64, seq: u64) -> Self {
        Self {
            id: OrderId(seq),
            trader: TraderId(seq),
            side,
            price,
            quantity,
            sequence: seq,
        }
    }

    pub fn dummy_for_trader(
        trader: TraderId,
        side: OrderSide,
        price: Decimal,
        quantity: u64,
        seq: u64,
    ) -> Self {
        Self {
            trader,
            ..Self::dummy(side, price, quantity, seq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(price: f64, quantity: u64) -> OrderRequest {
        OrderRequest::bid(OrderId(1), TraderId(1), price, quantity)
    }

    #[test]
    fn valid_request_converts_exactly() {
        let order = request(10.25, 3).into_order(9).unwrap();
        assert_eq!(order.price, Decimal::new(1025, 2));
        assert_eq!(order.quantity, 3);
        assert_eq!(order.sequence, 9);
        assert!(order.is_bid());
    }

    #[test]
    fn nan_price_rejected() {
        let err = request(f64::NAN, 1).validate().unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidOrder {
                reason: InvalidOrderReason::NanPrice,
                ..
            }
        ));
    }

    #[test]
    fn infinite_and_negative_prices_rejected() {
        assert!(request(f64::INFINITY, 1).validate().is_err());
        assert!(request(f64::NEG_INFINITY, 1).validate().is_err());
        let err = request(-0.5, 1).validate().unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidOrder {
                reason: InvalidOrderReason::NegativePrice,
                ..
            }
        ));
    }

    #[test]
    fn zero_quantity_rejected() {
        let err = request(1.0, 0).validate().unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidOrder {
                reason: InvalidOrderReason::ZeroQuantity,
                ..
            }
        ));
    }

    #[test]
    fn unrepresentable_notional_rejected() {
        let err = request(1e20, 10_000_000_000).validate().unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::InvalidOrder {
                reason: InvalidOrderReason::NotionalOverflow,
                ..
            }
        ));
        // Large but representable.
        assert!(request(1.0, u64::MAX).validate().is_ok());
        assert!(request(1e18, 1_000).validate().is_ok());
    }

    #[test]
    fn zero_price_is_valid() {
        assert_eq!(request(0.0, 1).validate().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn side_helpers() {
        assert_eq!(OrderSide::Bid.opposite(), OrderSide::Ask);
        assert_eq!(format!("{}", OrderSide::Ask), "ASK");
        let ask = Order::dummy(OrderSide::Ask, Decimal::new(10, 0), 5, 0);
        assert!(ask.is_ask());
        assert_eq!(ask.notional(2), Some(Decimal::new(20, 0)));
        assert_eq!(ask.with_quantity(1).quantity, 1);
    }
}
