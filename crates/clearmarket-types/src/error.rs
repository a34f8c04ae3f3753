//! Error types for the clearmarket kernel.
//!
//! All errors use the `CM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Funds / stock errors
//! - 3xx: Order book errors
//! - 4xx: Auction state errors
//! - 5xx: Settlement errors
//! - 9xx: Configuration / internal errors
//!
//! Everything a participant can trigger by submitting an order carries only
//! `Copy` data.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{MarketQuote, OrderId, OrderSide, TraderId};

/// Why an order request failed basic validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOrderReason {
    ZeroQuantity,
    NanPrice,
    InfinitePrice,
    NegativePrice,
    PriceOutOfRange,
    /// `price * quantity` does not fit in a `Decimal`.
    NotionalOverflow,
}

impl std::fmt::Display for InvalidOrderReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroQuantity => write!(f, "quantity must be positive"),
            Self::NanPrice => write!(f, "price is NaN"),
            Self::InfinitePrice => write!(f, "price is infinite"),
            Self::NegativePrice => write!(f, "price is negative"),
            Self::PriceOutOfRange => write!(f, "price is not representable"),
            Self::NotionalOverflow => write!(f, "price times quantity is not representable"),
        }
    }
}

/// Which settlement precondition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementReason {
    NotAnAsk,
    NotABid,
    ZeroQuantity,
    SelfTrade,
    NegativeAmount,
}

impl std::fmt::Display for SettlementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnAsk => write!(f, "sell leg is not an ask"),
            Self::NotABid => write!(f, "buy leg is not a bid"),
            Self::ZeroQuantity => write!(f, "quantity must be positive"),
            Self::SelfTrade => write!(f, "buyer and seller are the same trader"),
            Self::NegativeAmount => write!(f, "charge or payment is negative"),
        }
    }
}

/// Central error enum for all clearmarket operations.
#[derive(Debug, Error)]
pub enum ClearmarketError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// Malformed order; never enters the book.
    #[error("CM_ERR_100: Invalid order {order}: {reason}")]
    InvalidOrder {
        order: OrderId,
        reason: InvalidOrderReason,
    },

    /// An order with this id is already in the book.
    #[error("CM_ERR_101: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order does not improve on the current quote.
    #[error("CM_ERR_102: {side} at {price} does not improve on quote ({quote})")]
    NotAnImprovement {
        side: OrderSide,
        price: Decimal,
        quote: MarketQuote,
    },

    /// The order price lies outside the configured price band.
    #[error("CM_ERR_103: Price {price} outside band [{floor}, {ceiling}]")]
    OutsidePriceBand {
        price: Decimal,
        floor: Decimal,
        ceiling: Decimal,
    },

    // =================================================================
    // Funds / Stock Errors (2xx)
    // =================================================================
    /// Debit would take a standard account below zero.
    #[error("CM_ERR_200: Insufficient funds for {trader}: need {needed}, have {available}")]
    InsufficientFunds {
        trader: TraderId,
        needed: Decimal,
        available: Decimal,
    },

    /// The holding has fewer units than requested.
    #[error("CM_ERR_201: Insufficient stock for {trader}: need {needed}, have {available}")]
    InsufficientStock {
        trader: TraderId,
        needed: u64,
        available: u64,
    },

    /// No ledger entry exists for this trader.
    #[error("CM_ERR_202: Unknown trader: {0}")]
    UnknownTrader(TraderId),

    /// A ledger entry for this trader already exists.
    #[error("CM_ERR_203: Trader already registered: {0}")]
    DuplicateTrader(TraderId),

    // =================================================================
    // Order Book Errors (3xx)
    // =================================================================
    /// The requested order is not in the book.
    #[error("CM_ERR_300: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Accepting the order would push the side's unit total past `u64::MAX`.
    #[error("CM_ERR_301: Book cannot hold {quantity} more {side} units")]
    BookCapacityExceeded { side: OrderSide, quantity: u64 },

    // =================================================================
    // Auction State Errors (4xx)
    // =================================================================
    /// The market has closed; no further orders are accepted.
    #[error("CM_ERR_400: Market closed")]
    MarketClosed,

    /// A sealed-bid auctioneer does not reveal its book.
    #[error("CM_ERR_401: Shouts are not visible in a sealed-bid auction")]
    ShoutsNotVisible,

    // =================================================================
    // Settlement Errors (5xx)
    // =================================================================
    /// A settlement precondition failed; nothing was applied.
    #[error("CM_ERR_500: Invalid settlement: {reason}")]
    InvalidSettlement { reason: SettlementReason },

    /// Funds or stock were created or destroyed.
    #[error("CM_ERR_501: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Invalid configuration.
    #[error("CM_ERR_900: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("CM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// A balance, supply total or settlement amount left the representable
    /// range. Nothing was applied.
    #[error("CM_ERR_902: Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ClearmarketError>;

impl From<serde_json::Error> for ClearmarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ClearmarketError {
    /// Rejections a participant caused by submitting a bad order. The market
    /// keeps running after these.
    #[must_use]
    pub fn is_order_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrder { .. }
                | Self::DuplicateOrder(_)
                | Self::NotAnImprovement { .. }
                | Self::OutsidePriceBand { .. }
                | Self::UnknownTrader(_)
                | Self::MarketClosed
                | Self::OrderNotFound(_)
                | Self::BookCapacityExceeded { .. }
        )
    }

    /// Failures of a settlement precondition. The auctioneer takes the
    /// order at fault out of the book and keeps clearing.
    #[must_use]
    pub fn is_settlement_failure(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::InsufficientStock { .. }
                | Self::UnknownTrader(_)
                | Self::InvalidSettlement { .. }
                | Self::ArithmeticOverflow(_)
        )
    }

    /// The trader a funds, stock or account failure is about.
    #[must_use]
    pub fn trader(&self) -> Option<TraderId> {
        match self {
            Self::InsufficientFunds { trader, .. }
            | Self::InsufficientStock { trader, .. }
            | Self::UnknownTrader(trader)
            | Self::DuplicateTrader(trader) => Some(*trader),
            _ => None,
        }
    }
}
