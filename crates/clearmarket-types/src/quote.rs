//! Market quote derived from the four boundary values of the order book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current ask/bid quote.
///
/// `None` is the "open" sentinel: no ask quote means any bid would have to
/// wait (conceptually +inf), no bid quote means any ask would have to wait
/// (conceptually -inf). A quote never carries NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Price a new bid must reach to trade.
    pub ask: Option<Decimal>,
    /// Price a new ask must undercut to trade.
    pub bid: Option<Decimal>,
}

impl MarketQuote {
    /// Both sides open.
    pub const OPEN: Self = Self {
        ask: None,
        bid: None,
    };

    #[must_use]
    pub fn new(ask: Option<Decimal>, bid: Option<Decimal>) -> Self {
        Self { ask, bid }
    }

    /// Build from the book boundaries:
    /// `ask = min(lowest unmatched ask, lowest matched bid)`,
    /// `bid = max(highest unmatched bid, highest matched ask)`.
    #[must_use]
    pub fn from_boundaries(
        lowest_unmatched_ask: Option<Decimal>,
        lowest_matched_bid: Option<Decimal>,
        highest_unmatched_bid: Option<Decimal>,
        highest_matched_ask: Option<Decimal>,
    ) -> Self {
        let ask = match (lowest_unmatched_ask, lowest_matched_bid) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let bid = match (highest_unmatched_bid, highest_matched_ask) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        Self { ask, bid }
    }

    /// Both sides open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ask.is_none() && self.bid.is_none()
    }

    /// Both sides finite.
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        self.ask.is_some() && self.bid.is_some()
    }

    /// `ask - bid`, when both sides are present.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.ask? - self.bid?)
    }

    /// Midpoint of the two sides, when both are present.
    #[must_use]
    pub fn midpoint(&self) -> Option<Decimal> {
        Some((self.ask? + self.bid?) / Decimal::TWO)
    }
}

impl std::fmt::Display for MarketQuote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = |p: Option<Decimal>| p.map_or_else(|| "open".to_string(), |p| p.to_string());
        write!(f, "ask={} bid={}", side(self.ask), side(self.bid))
    }
}
