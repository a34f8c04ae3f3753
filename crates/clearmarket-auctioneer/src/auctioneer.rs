//! Auctioneer state machine.
//!
//! One [`Auctioneer`] runs one market under one [`AuctionRule`]:
//!
//! - **Continuous**: clears after every accepted order, discriminatory
//!   pricing per pair
//! - **Clearing house**: accumulates orders and clears once per round
//! - **McAfee**: clears once per round at the efficient midpoint when it is
//!   individually rational, otherwise withholds one unit and charges buyers
//!   and sellers the trimmed thresholds
//!
//! The auctioneer never pushes events. It queues them and the caller drains
//! them with [`Auctioneer::drain_events`].

use std::cell::Cell;

use chrono::Utc;
use clearmarket_matchcore::{MatchedPair, OrderBook, PricingPolicy, transaction_root_hex};
use clearmarket_settlement::{Account, Ledger};
use clearmarket_types::{
    AuctionRule, AuctioneerConfig, BookVisibility, ClearmarketError, MarketEvent, MarketQuote,
    Order, OrderId, OrderRequest, Result, TraderId, Transaction, TransactionId,
};
use rust_decimal::Decimal;

use crate::acceptance;
use crate::clearing_condition::ClearingGate;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionState {
    Open,
    Clearing,
    Closed,
}

/// How the pairs of one clearing event are priced.
#[derive(Debug, Clone, Copy)]
enum Terms {
    /// Ask the pricing policy, using the quote snapshot from the start of the
    /// event.
    Policy(MarketQuote),
    /// Buyers pay `buyer`, sellers receive `seller`, per unit.
    Fixed { buyer: Decimal, seller: Decimal },
}

/// Pair that failed settlement in one pass.
#[derive(Debug)]
struct FailedSettlement {
    pair: MatchedPair,
    error: ClearmarketError,
}

/// Outcome of one pass over the matched set.
#[derive(Debug, Default)]
struct Pass {
    executed: usize,
    failed: Option<FailedSettlement>,
}

#[derive(Debug)]
struct SettlementFailure {
    cancelled: Vec<OrderId>,
    error: ClearmarketError,
}

/// Outcome of one clearing event.
#[derive(Debug, Default)]
struct Clearing {
    executed: usize,
    failures: Vec<SettlementFailure>,
}

impl Clearing {
    /// The error that got `order` cancelled, if any.
    fn into_failure_of(self, order: OrderId) -> Option<ClearmarketError> {
        self.failures
            .into_iter()
            .find(|f| f.cancelled.contains(&order))
            .map(|f| f.error)
    }
}

#[derive(Debug)]
pub struct Auctioneer {
    config: AuctioneerConfig,
    state: AuctionState,
    book: OrderBook,
    pricing: PricingPolicy,
    gate: ClearingGate,
    ledger: Ledger,
    /// Cached quote; `None` once the book changes.
    quote: Cell<Option<MarketQuote>>,
    events: Vec<MarketEvent>,
    day: u32,
    round: u32,
    /// Arrival stamp of the next accepted order.
    next_sequence: u64,
    /// Fill counter within the current round.
    fill_sequence: u64,
    round_transactions: Vec<Transaction>,
    day_transactions: usize,
}

impl Auctioneer {
    /// Build a fresh auctioneer.
    ///
    /// # Errors
    /// [`ClearmarketError::Configuration`] if the config does not validate.
    pub fn from_config(config: &AuctioneerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            state: AuctionState::Open,
            book: OrderBook::new(),
            pricing: PricingPolicy::new(config.pricing)?,
            gate: ClearingGate::new(config.effective_clearing()),
            ledger: Ledger::new(),
            quote: Cell::new(None),
            events: Vec::new(),
            day: 0,
            round: 0,
            next_sequence: 0,
            fill_sequence: 0,
            round_transactions: Vec::new(),
            day_transactions: 0,
        })
    }

    // =================================================================
    // Orders
    // =================================================================

    /// Submit an order.
    ///
    /// Validates it, applies the acceptance policies, inserts it and clears
    /// if the clearing condition fires on orders.
    ///
    /// # Errors
    /// - [`ClearmarketError::MarketClosed`] after [`Self::close`]
    /// - [`ClearmarketError::InvalidOrder`] for a malformed request
    /// - [`ClearmarketError::UnknownTrader`] if the trader has no account
    /// - [`ClearmarketError::NotAnImprovement`] / [`ClearmarketError::OutsidePriceBand`]
    /// - [`ClearmarketError::DuplicateOrder`] / [`ClearmarketError::BookCapacityExceeded`]
    ///
    /// The book is unchanged when any of those is returned.
    ///
    /// If the clearing this order triggers cancels the order itself after a
    /// failed settlement, that settlement error is returned. Units of the
    /// order that settled before the failure stay settled. Failures of other
    /// traders' orders are only reported as [`MarketEvent::SettlementFailed`].
    pub fn new_order(&mut self, request: OrderRequest) -> Result<OrderId> {
        if self.state == AuctionState::Closed {
            return Err(ClearmarketError::MarketClosed);
        }
        let order = request.into_order(self.next_sequence)?;
        if !self.ledger.contains_trader(order.trader) {
            return Err(ClearmarketError::UnknownTrader(order.trader));
        }
        acceptance::check_all(&self.config.acceptance, &order, &self.quote())?;
        self.book.add(order.clone())?;
        self.next_sequence += 1;
        self.quote.set(None);

        tracing::debug!(
            order = %order.id,
            trader = %order.trader,
            side = %order.side,
            price = %order.price,
            qty = order.quantity,
            "Order accepted"
        );
        self.events.push(MarketEvent::OrderAccepted {
            order: order.id,
            trader: order.trader,
            side: order.side,
            price: order.price,
            quantity: order.quantity,
        });
        self.events.push(MarketEvent::QuoteUpdated(self.quote()));

        if self.gate.on_order() {
            if let Some(err) = self.run_clearing()?.into_failure_of(order.id) {
                return Err(err);
            }
        }
        Ok(order.id)
    }

    /// Withdraw an order. Does not clear.
    ///
    /// # Errors
    /// [`ClearmarketError::OrderNotFound`].
    pub fn remove_order(&mut self, order_id: OrderId) -> Result<Order> {
        let order = self.book.remove(&order_id)?;
        self.quote.set(None);
        self.events.push(MarketEvent::OrderWithdrawn {
            order: order.id,
            trader: order.trader,
        });
        self.events.push(MarketEvent::QuoteUpdated(self.quote()));
        Ok(order)
    }

    // =================================================================
    // Clearing
    // =================================================================

    /// Clear the matched set. Returns the number of transactions executed.
    ///
    /// A pair that fails settlement transfers nothing. The order at fault
    /// (both orders when the failure names neither trader) is taken out of
    /// the book, a [`MarketEvent::SettlementFailed`] is queued and clearing
    /// starts over on what is left, with a fresh quote snapshot.
    ///
    /// # Errors
    /// [`ClearmarketError::MarketClosed`] after [`Self::close`].
    pub fn clear(&mut self) -> Result<usize> {
        Ok(self.run_clearing()?.executed)
    }

    fn run_clearing(&mut self) -> Result<Clearing> {
        if self.state == AuctionState::Closed {
            return Err(ClearmarketError::MarketClosed);
        }
        let mut clearing = Clearing::default();
        if self.book.matched_quantity() == 0 {
            return Ok(clearing);
        }
        self.state = AuctionState::Clearing;
        loop {
            self.quote.set(None);
            let pass = match self.config.rule {
                AuctionRule::Continuous | AuctionRule::ClearingHouse => {
                    let snapshot = self.quote();
                    self.settle_pairs(Terms::Policy(snapshot), u64::MAX)
                }
                AuctionRule::McAfee => self.clear_mcafee(),
            };
            clearing.executed += pass.executed;
            let Some(failed) = pass.failed else {
                break;
            };
            let failure = self.cancel_failed(failed);
            let stuck = failure.cancelled.is_empty();
            clearing.failures.push(failure);
            if stuck {
                break;
            }
        }
        self.state = AuctionState::Open;
        self.quote.set(None);
        self.events.push(MarketEvent::QuoteUpdated(self.quote()));

        tracing::info!(
            rule = %self.config.rule,
            day = self.day,
            round = self.round,
            transactions = clearing.executed,
            failed_settlements = clearing.failures.len(),
            remaining = self.book.order_count(),
            "Clearing complete"
        );
        Ok(clearing)
    }

    fn clear_mcafee(&mut self) -> Pass {
        let (Some(b_k), Some(s_k)) = (self.book.lowest_matched_bid(), self.book.highest_matched_ask())
        else {
            return Pass::default();
        };
        let midpoint = match (self.book.highest_unmatched_bid(), self.book.lowest_unmatched_ask()) {
            (Some(b), Some(s)) => b.checked_add(s).map(|sum| sum / Decimal::TWO),
            _ => None,
        };

        match midpoint.filter(|p0| s_k <= *p0 && *p0 <= b_k) {
            Some(p0) => {
                tracing::debug!(price = %p0, "McAfee midpoint is individually rational");
                self.settle_pairs(
                    Terms::Fixed {
                        buyer: p0,
                        seller: p0,
                    },
                    u64::MAX,
                )
            }
            None => {
                let units = self.book.matched_quantity().saturating_sub(1);
                tracing::debug!(
                    buyer_price = %b_k,
                    seller_price = %s_k,
                    units,
                    "McAfee trimmed: one unit withheld"
                );
                self.settle_pairs(
                    Terms::Fixed {
                        buyer: b_k,
                        seller: s_k,
                    },
                    units,
                )
            }
        }
    }

    /// Settle matched pairs until `limit` units are consumed, no tradable
    /// pair is left, or a settlement fails. A failing pair stays in the book.
    fn settle_pairs(&mut self, terms: Terms, limit: u64) -> Pass {
        let mut remaining = limit;
        let mut pass = Pass::default();

        while remaining > 0 {
            let Some(pair) = self.book.peek_tradable_pair() else {
                break;
            };
            let (buyer_price, seller_price) = match terms {
                Terms::Fixed { buyer, seller } => (buyer, seller),
                Terms::Policy(snapshot) => {
                    match self.pricing.price_pair(&pair.bid, &pair.ask, &snapshot) {
                        Some(price) => (price, price),
                        None => {
                            tracing::warn!(
                                bid = %pair.bid.id,
                                ask = %pair.ask.id,
                                "No valid price for matched pair; left in book"
                            );
                            break;
                        }
                    }
                }
            };

            let quantity = pair.quantity.min(remaining);
            let deliverable = quantity.min(self.ledger.stock_of(pair.ask.trader));
            if deliverable > 0 {
                if let Err(error) = self.execute(&pair, buyer_price, seller_price, deliverable) {
                    pass.failed = Some(FailedSettlement { pair, error });
                    break;
                }
                pass.executed += 1;
            }
            if deliverable < quantity {
                tracing::warn!(
                    seller = %pair.ask.trader,
                    ask = %pair.ask.id,
                    bid = %pair.bid.id,
                    dropped = quantity - deliverable,
                    "Seller cannot deliver; undeliverable units dropped from both legs"
                );
            }
            self.book.take_pair(pair.bid.id, pair.ask.id, quantity);
            remaining -= quantity;
        }
        pass
    }

    fn execute(
        &mut self,
        pair: &MatchedPair,
        buyer_price: Decimal,
        seller_price: Decimal,
        quantity: u64,
    ) -> Result<()> {
        let units = Decimal::from(quantity);
        let buyer_charge = buyer_price
            .checked_mul(units)
            .ok_or(ClearmarketError::ArithmeticOverflow("buyer charge"))?;
        let seller_payment = seller_price
            .checked_mul(units)
            .ok_or(ClearmarketError::ArithmeticOverflow("seller payment"))?;
        self.ledger
            .settle(&pair.ask, &pair.bid, buyer_charge, seller_payment, quantity)?;

        let transaction = Transaction {
            id: TransactionId::deterministic(self.day, self.round, self.fill_sequence),
            day: self.day,
            round: self.round,
            bid_order: pair.bid.id,
            ask_order: pair.ask.id,
            buyer: pair.bid.trader,
            seller: pair.ask.trader,
            price: buyer_price,
            seller_price,
            quantity,
            buyer_charge,
            seller_payment,
            executed_at: Utc::now(),
        };
        self.fill_sequence += 1;
        self.pricing.record(buyer_price);

        tracing::debug!(
            transaction = %transaction.id,
            buyer = %transaction.buyer,
            seller = %transaction.seller,
            price = %transaction.price,
            qty = quantity,
            "Transaction executed"
        );
        self.round_transactions.push(transaction.clone());
        self.events.push(MarketEvent::TransactionExecuted(transaction));
        Ok(())
    }

    /// Take the orders at fault for a failed settlement out of the book.
    fn cancel_failed(&mut self, failed: FailedSettlement) -> SettlementFailure {
        let FailedSettlement { pair, error } = failed;
        let at_fault = match error.trader() {
            Some(trader) if trader == pair.bid.trader => vec![pair.bid.id],
            Some(trader) if trader == pair.ask.trader => vec![pair.ask.id],
            _ => vec![pair.bid.id, pair.ask.id],
        };
        let mut cancelled = Vec::with_capacity(at_fault.len());
        for order_id in at_fault {
            if self.book.remove(&order_id).is_ok() {
                cancelled.push(order_id);
            }
        }

        tracing::warn!(
            bid = %pair.bid.id,
            ask = %pair.ask.id,
            cancelled = ?cancelled,
            error = %error,
            "Settlement failed; orders at fault cancelled"
        );
        self.events.push(MarketEvent::SettlementFailed {
            bid: pair.bid.id,
            ask: pair.ask.id,
            buyer: pair.bid.trader,
            seller: pair.ask.trader,
            quantity: pair.quantity,
            cancelled: cancelled.clone(),
            reason: error.to_string(),
        });
        SettlementFailure { cancelled, error }
    }

    // =================================================================
    // Round / day lifecycle
    // =================================================================

    /// Close the current round, clearing first if the condition fires on
    /// rounds. Returns the number of transactions that clearing executed.
    ///
    /// Failed settlements during that clearing are reported as events and
    /// never stop the round from closing.
    ///
    /// # Errors
    /// [`ClearmarketError::MarketClosed`] if the clearing runs on a closed
    /// market.
    pub fn end_of_round(&mut self) -> Result<usize> {
        let executed = if self.state != AuctionState::Closed && self.gate.on_round() {
            self.clear()?
        } else {
            0
        };

        let transaction_root = transaction_root_hex(&self.round_transactions);
        tracing::info!(
            day = self.day,
            round = self.round,
            transactions = self.round_transactions.len(),
            transaction_root = %transaction_root,
            "Round closed"
        );
        self.events.push(MarketEvent::RoundClosed {
            day: self.day,
            round: self.round,
            transactions: self.round_transactions.len(),
            transaction_root,
        });

        self.day_transactions += self.round_transactions.len();
        self.round_transactions.clear();
        self.fill_sequence = 0;
        self.round += 1;
        Ok(executed)
    }

    /// Close the trading day. Every order still in the book is discarded.
    pub fn end_of_day(&mut self) {
        let transactions = self.day_transactions + self.round_transactions.len();
        tracing::info!(
            day = self.day,
            transactions,
            discarded_orders = self.book.order_count(),
            "Day closed"
        );
        self.events.push(MarketEvent::DayClosed {
            day: self.day,
            transactions,
        });

        self.book.reset();
        self.gate.reset();
        self.quote.set(None);
        self.round_transactions.clear();
        self.day_transactions = 0;
        self.fill_sequence = 0;
        self.round = 0;
        self.day += 1;
    }

    /// Close the market. Later orders fail with `MarketClosed`. Returns the
    /// orders that were still in the book.
    pub fn close(&mut self) -> Vec<Order> {
        let drained = self.book.drain_all();
        self.state = AuctionState::Closed;
        self.quote.set(None);
        tracing::info!(discarded_orders = drained.len(), "Market closed");
        self.events.push(MarketEvent::MarketClosed);
        drained
    }

    /// Return to the freshly-built state. Trader accounts are restored to
    /// their opening endowments.
    pub fn reset(&mut self) {
        self.state = AuctionState::Open;
        self.book.reset();
        self.pricing.reset();
        self.gate.reset();
        self.ledger.reset();
        self.quote.set(None);
        self.events.clear();
        self.day = 0;
        self.round = 0;
        self.next_sequence = 0;
        self.fill_sequence = 0;
        self.round_transactions.clear();
        self.day_transactions = 0;
    }

    /// Take every queued event, oldest first.
    pub fn drain_events(&mut self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events)
    }

    // =================================================================
    // Accounts
    // =================================================================

    /// Give a trader an account with an opening endowment.
    ///
    /// # Errors
    /// [`ClearmarketError::DuplicateTrader`].
    pub fn open_account(&mut self, trader: TraderId, funds: Decimal, stock: u64) -> Result<()> {
        self.ledger.open_account(trader, funds, stock)
    }

    /// The auctioneer's own clearing account.
    #[must_use]
    pub fn account(&self) -> &Account {
        self.ledger.house()
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Current quote, recomputed only after the book changed.
    #[must_use]
    pub fn quote(&self) -> MarketQuote {
        if let Some(quote) = self.quote.get() {
            return quote;
        }
        let quote = self.book.quote();
        self.quote.set(Some(quote));
        quote
    }

    /// # Errors
    /// [`ClearmarketError::ShoutsNotVisible`] for a sealed-bid auctioneer.
    pub fn unmatched_bids(&self) -> Result<Vec<Order>> {
        self.ensure_visible()?;
        Ok(self.book.unmatched_bids())
    }

    /// # Errors
    /// [`ClearmarketError::ShoutsNotVisible`] for a sealed-bid auctioneer.
    pub fn unmatched_asks(&self) -> Result<Vec<Order>> {
        self.ensure_visible()?;
        Ok(self.book.unmatched_asks())
    }

    fn ensure_visible(&self) -> Result<()> {
        match self.config.visibility {
            BookVisibility::Transparent => Ok(()),
            BookVisibility::Sealed => Err(ClearmarketError::ShoutsNotVisible),
        }
    }

    #[must_use]
    pub fn state(&self) -> AuctionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &AuctioneerConfig {
        &self.config
    }

    #[must_use]
    pub fn day(&self) -> u32 {
        self.day
    }

    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    #[must_use]
    pub fn matched_quantity(&self) -> u64 {
        self.book.matched_quantity()
    }

    #[must_use]
    pub fn last_price(&self) -> Option<Decimal> {
        self.pricing.last_price()
    }
}
