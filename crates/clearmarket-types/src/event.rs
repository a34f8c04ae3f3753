//! Events produced by the auctioneer.
//!
//! The auctioneer never pushes events to anyone. It queues them and the
//! market facade drains the queue and hands each event to its observers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketQuote, OrderId, OrderSide, TraderId, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    OrderAccepted {
        order: OrderId,
        trader: TraderId,
        side: OrderSide,
        price: Decimal,
        quantity: u64,
    },
    OrderWithdrawn {
        order: OrderId,
        trader: TraderId,
    },
    QuoteUpdated(MarketQuote),
    TransactionExecuted(Transaction),
    /// A matched pair failed settlement. Nothing was transferred and the
    /// `cancelled` orders were taken out of the book.
    SettlementFailed {
        bid: OrderId,
        ask: OrderId,
        buyer: TraderId,
        seller: TraderId,
        quantity: u64,
        cancelled: Vec<OrderId>,
        reason: String,
    },
    RoundClosed {
        day: u32,
        round: u32,
        transactions: usize,
        /// Hex-encoded digest over the round's transactions.
        transaction_root: String,
    },
    DayClosed {
        day: u32,
        transactions: usize,
    },
    MarketClosed,
}

impl MarketEvent {
    /// Short tag used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderAccepted { .. } => "ORDER_ACCEPTED",
            Self::OrderWithdrawn { .. } => "ORDER_WITHDRAWN",
            Self::QuoteUpdated(_) => "QUOTE_UPDATED",
            Self::TransactionExecuted(_) => "TRANSACTION_EXECUTED",
            Self::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            Self::RoundClosed { .. } => "ROUND_CLOSED",
            Self::DayClosed { .. } => "DAY_CLOSED",
            Self::MarketClosed => "MARKET_CLOSED",
        }
    }

    /// The transaction carried by this event, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Self::TransactionExecuted(t) => Some(t),
            _ => None,
        }
    }
}
