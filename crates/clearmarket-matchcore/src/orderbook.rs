//! Four-heap order book.
//!
//! Orders are kept in four partitions:
//!
//! - **matched bids** / **matched asks**: units currently paired for clearing
//! - **unmatched bids** / **unmatched asks**: units waiting for a counter-order
//!
//! and the book maintains, after every operation:
//!
//! ```text
//! qty(matched bids) == qty(matched asks)
//! min(matched bids)   >= max(matched asks)
//! max(unmatched bids) <= min(matched bids)
//! min(unmatched asks) >= max(matched asks)
//! max(unmatched bids) <  min(unmatched asks)
//! ```
//!
//! Insertion walks the new order across the boundary one fragment at a
//! time, so each step touches only the partition fronts instead of
//! re-matching the whole book. An order may be split between its side's
//! matched and unmatched partitions.

use std::collections::HashMap;

use clearmarket_types::{
    ClearmarketError, MarketQuote, Order, OrderId, OrderSide, Result, TraderId,
};
use rust_decimal::Decimal;

use crate::partition::{Fragment, Partition, PriceOrder, TimeOrder};

/// A bid and an ask paired for clearing, both restricted to `quantity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub bid: Order,
    pub ask: Order,
    pub quantity: u64,
}

/// The four-heap order book for one market.
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Every order in the book; `quantity` is its outstanding unit count.
    orders: HashMap<OrderId, Order>,
    matched_bids: Partition,
    matched_asks: Partition,
    unmatched_bids: Partition,
    unmatched_asks: Partition,
}

impl OrderBook {
    /// Create a new empty order book.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
            matched_bids: Partition::new(PriceOrder::LowestFirst, TimeOrder::LatestFirst),
            matched_asks: Partition::new(PriceOrder::HighestFirst, TimeOrder::LatestFirst),
            unmatched_bids: Partition::new(PriceOrder::HighestFirst, TimeOrder::EarliestFirst),
            unmatched_asks: Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst),
        }
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Insert an order and re-partition the book around it.
    ///
    /// # Errors
    /// - [`ClearmarketError::DuplicateOrder`] if the id is already present
    /// - [`ClearmarketError::BookCapacityExceeded`] if the side would hold
    ///   more than `u64::MAX` units
    ///
    /// The book is left unchanged on error.
    pub fn add(&mut self, order: Order) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(ClearmarketError::DuplicateOrder(order.id));
        }
        if self.side_quantity(order.side).checked_add(order.quantity).is_none() {
            return Err(ClearmarketError::BookCapacityExceeded {
                side: order.side,
                quantity: order.quantity,
            });
        }

        let fragment = Fragment::of(&order, order.quantity);
        let side = order.side;
        tracing::debug!(
            order = %order.id,
            side = %side,
            price = %order.price,
            qty = order.quantity,
            "Order added to book"
        );
        self.orders.insert(order.id, order);
        self.insert_fragment(side, fragment);
        Ok(())
    }

    fn insert_fragment(&mut self, side: OrderSide, fragment: Fragment) {
        match side {
            OrderSide::Bid => self.insert_bid(fragment),
            OrderSide::Ask => self.insert_ask(fragment),
        }
    }

    fn insert_bid(&mut self, mut bid: Fragment) {
        while bid.quantity > 0 {
            let lowest_ask = self.unmatched_asks.front().map(|f| f.price);
            let lowest_matched_bid = self.matched_bids.front().map(|f| f.price);

            let promotes = match lowest_ask {
                Some(ask) => bid.price >= ask && lowest_matched_bid.is_none_or(|b| b >= ask),
                None => false,
            };
            if promotes {
                // Pair with the cheapest waiting ask.
                let Some(ask) = self.unmatched_asks.take_front(bid.quantity) else {
                    break;
                };
                self.matched_bids.insert(bid.split_off(ask.quantity));
                self.matched_asks.insert(ask);
                continue;
            }

            let displaces = lowest_matched_bid.is_some_and(|b| bid.price > b);
            if displaces {
                // Take the place of the weakest matched bid.
                let Some(displaced) = self.matched_bids.take_front(bid.quantity) else {
                    break;
                };
                self.matched_bids.insert(bid.split_off(displaced.quantity));
                self.unmatched_bids.insert(displaced);
                continue;
            }

            break;
        }
        self.unmatched_bids.insert(bid);
    }

    fn insert_ask(&mut self, mut ask: Fragment) {
        while ask.quantity > 0 {
            let highest_bid = self.unmatched_bids.front().map(|f| f.price);
            let highest_matched_ask = self.matched_asks.front().map(|f| f.price);

            let promotes = match highest_bid {
                Some(bid) => ask.price <= bid && highest_matched_ask.is_none_or(|a| a <= bid),
                None => false,
            };
            if promotes {
                let Some(bid) = self.unmatched_bids.take_front(ask.quantity) else {
                    break;
                };
                self.matched_asks.insert(ask.split_off(bid.quantity));
                self.matched_bids.insert(bid);
                continue;
            }

            let displaces = highest_matched_ask.is_some_and(|a| ask.price < a);
            if displaces {
                let Some(displaced) = self.matched_asks.take_front(ask.quantity) else {
                    break;
                };
                self.matched_asks.insert(ask.split_off(displaced.quantity));
                self.unmatched_asks.insert(displaced);
                continue;
            }

            break;
        }
        self.unmatched_asks.insert(ask);
    }

    // =================================================================
    // Removal
    // =================================================================

    /// Withdraw an order. Returns it with its outstanding quantity.
    ///
    /// Matched units of the withdrawn order leave their counterparts
    /// unpaired; those counterparts are taken out and inserted again so
    /// they can pair with whatever is waiting.
    ///
    /// # Errors
    /// [`ClearmarketError::OrderNotFound`] if the id is not in the book.
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Order> {
        let order = self
            .orders
            .remove(order_id)
            .ok_or(ClearmarketError::OrderNotFound(*order_id))?;

        let (matched, unmatched) = match order.side {
            OrderSide::Bid => (&mut self.matched_bids, &mut self.unmatched_bids),
            OrderSide::Ask => (&mut self.matched_asks, &mut self.unmatched_asks),
        };
        let matched_units = matched.remove(&order).map_or(0, |f| f.quantity);
        unmatched.remove(&order);

        if matched_units > 0 {
            self.rematch(order.side.opposite(), matched_units);
        }

        tracing::debug!(
            order = %order.id,
            side = %order.side,
            matched_units,
            "Order removed from book"
        );
        Ok(order)
    }

    /// Pull `units` of the weakest matched orders on `side` and insert them
    /// again.
    fn rematch(&mut self, side: OrderSide, mut units: u64) {
        let matched = match side {
            OrderSide::Bid => &mut self.matched_bids,
            OrderSide::Ask => &mut self.matched_asks,
        };
        let mut pulled = Vec::new();
        while units > 0 {
            let Some(fragment) = matched.take_front(units) else {
                break;
            };
            units -= fragment.quantity;
            pulled.push(fragment);
        }
        for fragment in pulled {
            self.insert_fragment(side, fragment);
        }
    }

    // =================================================================
    // Matched pairs
    // =================================================================

    /// Lazily pair matched bids with matched asks, highest bid with lowest
    /// ask first. Calling again restarts from the top.
    #[must_use]
    pub fn matched_pairs(&self) -> MatchedPairs<'_> {
        MatchedPairs {
            book: self,
            bids: Box::new(self.matched_bids.iter().rev()),
            asks: Box::new(self.matched_asks.iter().rev()),
            bid: None,
            ask: None,
        }
    }

    /// The pair [`Self::pop_matched_pair`] would consume next.
    #[must_use]
    pub fn peek_matched_pair(&self) -> Option<MatchedPair> {
        self.matched_pairs().next()
    }

    /// The next pair whose legs belong to different traders.
    ///
    /// This is the head pair unless one trader owns both of its legs. In that
    /// case the head bid is paired with the lowest matched ask of another
    /// trader, or failing that the head ask with the highest matched bid of
    /// another trader. Any matched bid clears against any matched ask, so
    /// the substitute pair is still gains-from-trade. `None` when every
    /// matched unit belongs to a single trader.
    #[must_use]
    pub fn peek_tradable_pair(&self) -> Option<MatchedPair> {
        let head = self.peek_matched_pair()?;
        if head.bid.trader != head.ask.trader {
            return Some(head);
        }
        let trader = head.bid.trader;
        let head_bid = self.matched_bids.back()?;
        let head_ask = self.matched_asks.back()?;

        if let Some(ask) = self.first_not_owned_by(&self.matched_asks, trader) {
            return self.pair_fragments(head_bid, ask);
        }
        let bid = self.first_not_owned_by(&self.matched_bids, trader)?;
        self.pair_fragments(bid, head_ask)
    }

    /// Most competitive fragment of `partition` (clearing order) whose order
    /// is not `trader`'s.
    fn first_not_owned_by<'a>(
        &'a self,
        partition: &'a Partition,
        trader: TraderId,
    ) -> Option<&'a Fragment> {
        partition.iter().rev().find(|f| {
            self.orders
                .get(&f.order_id)
                .is_some_and(|o| o.trader != trader)
        })
    }

    fn pair_fragments(&self, bid: &Fragment, ask: &Fragment) -> Option<MatchedPair> {
        let quantity = bid.quantity.min(ask.quantity);
        let bid = self.orders.get(&bid.order_id)?.with_quantity(quantity);
        let ask = self.orders.get(&ask.order_id)?.with_quantity(quantity);
        Some(MatchedPair { bid, ask, quantity })
    }

    /// Consume up to `limit` matched units of the pair `bid`/`ask`, which
    /// need not be the head pair. Equal units leave both matched sides, so
    /// the four-heap invariants still hold.
    pub fn take_pair(&mut self, bid: OrderId, ask: OrderId, limit: u64) -> Option<MatchedPair> {
        let bid_order = self.orders.get(&bid)?.clone();
        let ask_order = self.orders.get(&ask)?.clone();
        let quantity = self
            .matched_bids
            .quantity_of(&bid_order)
            .min(self.matched_asks.quantity_of(&ask_order))
            .min(limit);
        if quantity == 0 {
            return None;
        }
        let bid = self.matched_bids.take_order(&bid_order, quantity)?;
        let ask = self.matched_asks.take_order(&ask_order, quantity)?;
        let bid = self.consume(&bid)?;
        let ask = self.consume(&ask)?;
        tracing::debug!(bid = %bid.id, ask = %ask.id, qty = quantity, "Matched pair taken");
        Some(MatchedPair { bid, ask, quantity })
    }

    /// Consume the head pair, removing its units from both matched sides.
    pub fn pop_matched_pair(&mut self) -> Option<MatchedPair> {
        self.pop_matched_pair_upto(u64::MAX)
    }

    /// Consume at most `limit` units of the head pair. Any units left over
    /// stay matched.
    pub fn pop_matched_pair_upto(&mut self, limit: u64) -> Option<MatchedPair> {
        if limit == 0 {
            return None;
        }
        let bid_units = self.matched_bids.back()?.quantity;
        let ask_units = self.matched_asks.back()?.quantity;
        let quantity = bid_units.min(ask_units).min(limit);

        let bid = self.matched_bids.take_back(quantity)?;
        let ask = self.matched_asks.take_back(quantity)?;
        let bid = self.consume(&bid)?;
        let ask = self.consume(&ask)?;
        Some(MatchedPair { bid, ask, quantity })
    }

    /// Deduct a consumed fragment from its order; returns the order
    /// restricted to the consumed units.
    fn consume(&mut self, fragment: &Fragment) -> Option<Order> {
        let order = self.orders.get_mut(&fragment.order_id)?;
        order.quantity -= fragment.quantity;
        let consumed = order.with_quantity(fragment.quantity);
        if order.quantity == 0 {
            self.orders.remove(&fragment.order_id);
        }
        Some(consumed)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Current quote derived from the four boundary prices.
    #[must_use]
    pub fn quote(&self) -> MarketQuote {
        MarketQuote::from_boundaries(
            self.lowest_unmatched_ask(),
            self.lowest_matched_bid(),
            self.highest_unmatched_bid(),
            self.highest_matched_ask(),
        )
    }

    /// Price of the highest unmatched bid.
    #[must_use]
    pub fn highest_unmatched_bid(&self) -> Option<Decimal> {
        self.unmatched_bids.front().map(|f| f.price)
    }

    /// Price of the lowest unmatched ask.
    #[must_use]
    pub fn lowest_unmatched_ask(&self) -> Option<Decimal> {
        self.unmatched_asks.front().map(|f| f.price)
    }

    /// Price of the highest matched ask.
    #[must_use]
    pub fn highest_matched_ask(&self) -> Option<Decimal> {
        self.matched_asks.front().map(|f| f.price)
    }

    /// Price of the lowest matched bid.
    #[must_use]
    pub fn lowest_matched_bid(&self) -> Option<Decimal> {
        self.matched_bids.front().map(|f| f.price)
    }

    /// Units of one side held in the book, matched or not.
    #[must_use]
    pub fn side_quantity(&self, side: OrderSide) -> u64 {
        // Bounded by the capacity check in `add`.
        match side {
            OrderSide::Bid => self
                .matched_bids
                .total_quantity()
                .saturating_add(self.unmatched_bids.total_quantity()),
            OrderSide::Ask => self
                .matched_asks
                .total_quantity()
                .saturating_add(self.unmatched_asks.total_quantity()),
        }
    }

    /// Units currently paired (equal on both sides).
    #[must_use]
    pub fn matched_quantity(&self) -> u64 {
        self.matched_bids.total_quantity()
    }

    /// Unmatched bids, highest first, each restricted to its unmatched units.
    #[must_use]
    pub fn unmatched_bids(&self) -> Vec<Order> {
        self.collect(&self.unmatched_bids)
    }

    /// Unmatched asks, lowest first, each restricted to its unmatched units.
    #[must_use]
    pub fn unmatched_asks(&self) -> Vec<Order> {
        self.collect(&self.unmatched_asks)
    }

    fn collect(&self, partition: &Partition) -> Vec<Order> {
        partition
            .iter()
            .filter_map(|f| self.orders.get(&f.order_id).map(|o| o.with_quantity(f.quantity)))
            .collect()
    }

    /// Outstanding (matched + unmatched) units of an order.
    #[must_use]
    pub fn get_order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Units of an order currently matched.
    #[must_use]
    pub fn matched_units_of(&self, order_id: &OrderId) -> u64 {
        self.orders.get(order_id).map_or(0, |o| match o.side {
            OrderSide::Bid => self.matched_bids.quantity_of(o),
            OrderSide::Ask => self.matched_asks.quantity_of(o),
        })
    }

    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    // =================================================================
    // Maintenance
    // =================================================================

    /// Drop every order.
    pub fn reset(&mut self) {
        self.orders.clear();
        self.matched_bids.clear();
        self.matched_asks.clear();
        self.unmatched_bids.clear();
        self.unmatched_asks.clear();
    }

    /// Remove every order, returned in arrival order.
    pub fn drain_all(&mut self) -> Vec<Order> {
        let mut all: Vec<Order> = self.orders.drain().map(|(_, o)| o).collect();
        all.sort_by_key(|o| o.sequence);
        self.reset();
        all
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl OrderBook {
    /// Panic if any four-heap invariant is broken.
    pub fn assert_invariants(&self) {
        assert_eq!(
            self.matched_bids.total_quantity(),
            self.matched_asks.total_quantity(),
            "matched quantities differ"
        );
        if let (Some(b), Some(a)) = (self.lowest_matched_bid(), self.highest_matched_ask()) {
            assert!(b >= a, "matched bid {b} below matched ask {a}");
        }
        if let (Some(out), Some(inside)) = (self.highest_unmatched_bid(), self.lowest_matched_bid()) {
            assert!(out <= inside, "unmatched bid {out} above matched bid {inside}");
        }
        if let (Some(out), Some(inside)) = (self.lowest_unmatched_ask(), self.highest_matched_ask()) {
            assert!(out >= inside, "unmatched ask {out} below matched ask {inside}");
        }
        if let (Some(b), Some(a)) = (self.highest_unmatched_bid(), self.lowest_unmatched_ask()) {
            assert!(b < a, "unmatched bid {b} crosses unmatched ask {a}");
        }
        for pair in self.matched_pairs() {
            assert!(pair.bid.price >= pair.ask.price, "pair not gains-from-trade");
        }
        for side in [OrderSide::Bid, OrderSide::Ask] {
            let outstanding: u64 = self
                .orders
                .values()
                .filter(|o| o.side == side)
                .map(|o| o.quantity)
                .sum();
            assert_eq!(
                self.side_quantity(side),
                outstanding,
                "{side} fragment units differ from order units"
            );
        }
    }
}

/// Iterator over matched pairs; see [`OrderBook::matched_pairs`].
pub struct MatchedPairs<'a> {
    book: &'a OrderBook,
    bids: Box<dyn Iterator<Item = &'a Fragment> + 'a>,
    asks: Box<dyn Iterator<Item = &'a Fragment> + 'a>,
    bid: Option<(&'a Fragment, u64)>,
    ask: Option<(&'a Fragment, u64)>,
}

impl Iterator for MatchedPairs<'_> {
    type Item = MatchedPair;

    fn next(&mut self) -> Option<MatchedPair> {
        if self.bid.is_none() {
            self.bid = self.bids.next().map(|f| (f, f.quantity));
        }
        if self.ask.is_none() {
            self.ask = self.asks.next().map(|f| (f, f.quantity));
        }
        let (bid, bid_left) = self.bid?;
        let (ask, ask_left) = self.ask?;
        let quantity = bid_left.min(ask_left);

        self.bid = (bid_left > quantity).then_some((bid, bid_left - quantity));
        self.ask = (ask_left > quantity).then_some((ask, ask_left - quantity));

        let bid = self.book.orders.get(&bid.order_id)?.with_quantity(quantity);
        let ask = self.book.orders.get(&ask.order_id)?.with_quantity(quantity);
        Some(MatchedPair { bid, ask, quantity })
    }
}
