//! Market facade: drives rounds and days over one [`Auctioneer`].
//!
//! Traders act in registration order. Each trader's actions go to the
//! auctioneer, and the events they cause are delivered to every trader and
//! observer before the next trader acts.

use clearmarket_types::{
    ClearmarketError, IdAllocator, MarketConfig, MarketEvent, MarketQuote, OrderId, OrderRequest,
    Result, TraderId, constants,
};
use rust_decimal::Decimal;

use crate::auctioneer::Auctioneer;

/// What a trader wants done this turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraderAction {
    Submit(OrderRequest),
    Withdraw(OrderId),
}

/// What a trader sees when it is its turn.
pub struct RoundContext<'a> {
    pub day: u32,
    pub round: u32,
    pub quote: MarketQuote,
    trader: TraderId,
    ids: &'a mut IdAllocator,
}

impl RoundContext<'_> {
    /// Allocate a fresh order id.
    pub fn next_order_id(&mut self) -> OrderId {
        self.ids.next_order_id()
    }

    /// Bid request for the acting trader with a fresh id.
    pub fn bid(&mut self, price: f64, quantity: u64) -> OrderRequest {
        let id = self.next_order_id();
        OrderRequest::bid(id, self.trader, price, quantity)
    }

    /// Ask request for the acting trader with a fresh id.
    pub fn ask(&mut self, price: f64, quantity: u64) -> OrderRequest {
        let id = self.next_order_id();
        OrderRequest::ask(id, self.trader, price, quantity)
    }

    #[must_use]
    pub fn trader(&self) -> TraderId {
        self.trader
    }
}

/// A market participant. Its pricing strategy is its own business.
pub trait Trader {
    fn id(&self) -> TraderId;

    /// Decide this turn's actions.
    fn act(&mut self, ctx: &mut RoundContext<'_>) -> Vec<TraderAction>;

    /// Every market event, in order.
    fn on_event(&mut self, _event: &MarketEvent) {}

    /// One of this trader's submissions was refused.
    fn on_rejected(&mut self, _request: &OrderRequest, _error: &ClearmarketError) {}
}

/// Passive consumer of market events (reports, charts, statistics).
pub trait MarketObserver {
    fn on_event(&mut self, event: &MarketEvent);
}

pub struct Market {
    auctioneer: Auctioneer,
    traders: Vec<Box<dyn Trader>>,
    observers: Vec<Box<dyn MarketObserver>>,
    ids: IdAllocator,
    rounds_per_day: u32,
    verify_supply_at_day_end: bool,
}

impl Market {
    #[must_use]
    pub fn new(auctioneer: Auctioneer) -> Self {
        Self {
            auctioneer,
            traders: Vec::new(),
            observers: Vec::new(),
            ids: IdAllocator::new(),
            rounds_per_day: constants::DEFAULT_ROUNDS_PER_DAY,
            verify_supply_at_day_end: true,
        }
    }

    /// # Errors
    /// [`ClearmarketError::Configuration`] for an invalid auctioneer config
    /// or zero rounds per day.
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        if config.rounds_per_day == 0 {
            return Err(ClearmarketError::Configuration(
                "rounds_per_day must be at least 1".to_string(),
            ));
        }
        let mut market = Self::new(Auctioneer::from_config(&config.auctioneer)?);
        market.rounds_per_day = config.rounds_per_day;
        market.verify_supply_at_day_end = config.verify_supply_at_day_end;
        Ok(market)
    }

    /// Id source for traders and orders of this market.
    pub fn ids(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    /// Register a trader with an opening endowment.
    ///
    /// # Errors
    /// [`ClearmarketError::DuplicateTrader`] if its id is already registered.
    pub fn register_trader(
        &mut self,
        trader: Box<dyn Trader>,
        funds: Decimal,
        stock: u64,
    ) -> Result<TraderId> {
        let id = trader.id();
        self.auctioneer.open_account(id, funds, stock)?;
        self.traders.push(trader);
        tracing::debug!(trader = %id, funds = %funds, stock, "Trader registered");
        Ok(id)
    }

    pub fn subscribe(&mut self, observer: Box<dyn MarketObserver>) {
        self.observers.push(observer);
    }

    /// Give every trader one turn, then close the round. Returns the number
    /// of transactions executed at round end.
    ///
    /// Order rejections are reported to the trader and the round goes on. So
    /// is a failed settlement that cancelled the trader's own order; failures
    /// that cancelled other traders' orders reach everyone as events. Queued
    /// events are delivered before any error is returned.
    ///
    /// # Errors
    /// Any other auctioneer error.
    pub fn run_round(&mut self) -> Result<usize> {
        for idx in 0..self.traders.len() {
            let trader = &mut self.traders[idx];
            let mut ctx = RoundContext {
                day: self.auctioneer.day(),
                round: self.auctioneer.round(),
                quote: self.auctioneer.quote(),
                trader: trader.id(),
                ids: &mut self.ids,
            };
            let actions = trader.act(&mut ctx);

            for action in actions {
                match action {
                    TraderAction::Submit(request) => {
                        match self.auctioneer.new_order(request) {
                            Ok(_) => {}
                            Err(err) if err.is_order_rejection() => {
                                tracing::warn!(
                                    trader = %request.trader,
                                    order = %request.id,
                                    error = %err,
                                    "Order rejected"
                                );
                                trader.on_rejected(&request, &err);
                            }
                            Err(err) if err.is_settlement_failure() => {
                                tracing::warn!(
                                    trader = %request.trader,
                                    order = %request.id,
                                    error = %err,
                                    "Order cancelled after failed settlement"
                                );
                                trader.on_rejected(&request, &err);
                            }
                            Err(err) => {
                                self.dispatch();
                                return Err(err);
                            }
                        }
                    }
                    TraderAction::Withdraw(order_id) => {
                        if let Err(err) = self.auctioneer.remove_order(order_id) {
                            tracing::warn!(order = %order_id, error = %err, "Withdrawal failed");
                        }
                    }
                }
            }
            self.dispatch();
        }

        let executed = self.auctioneer.end_of_round();
        self.dispatch();
        executed
    }

    /// Close the trading day and, when configured, verify that funds and
    /// stock were conserved.
    ///
    /// # Errors
    /// [`ClearmarketError::SupplyInvariantViolation`].
    pub fn end_day(&mut self) -> Result<()> {
        self.auctioneer.end_of_day();
        self.dispatch();
        if self.verify_supply_at_day_end {
            self.auctioneer.ledger().verify_conservation()?;
        }
        Ok(())
    }

    /// Run `rounds` rounds and close the day. Returns the transactions
    /// executed at round ends.
    ///
    /// # Errors
    /// As [`Self::run_round`] and [`Self::end_day`].
    pub fn run_day(&mut self, rounds: u32) -> Result<usize> {
        let mut executed = 0;
        for _ in 0..rounds {
            executed += self.run_round()?;
        }
        self.end_day()?;
        Ok(executed)
    }

    /// Run `days` days of the configured number of rounds.
    ///
    /// # Errors
    /// As [`Self::run_day`].
    pub fn run(&mut self, days: u32) -> Result<usize> {
        let mut executed = 0;
        for _ in 0..days {
            executed += self.run_day(self.rounds_per_day)?;
        }
        Ok(executed)
    }

    pub fn close(&mut self) {
        self.auctioneer.close();
        self.dispatch();
    }

    /// Reset the auctioneer; traders and observers stay registered.
    pub fn reset(&mut self) {
        self.auctioneer.reset();
    }

    #[must_use]
    pub fn auctioneer(&self) -> &Auctioneer {
        &self.auctioneer
    }

    #[must_use]
    pub fn trader_count(&self) -> usize {
        self.traders.len()
    }

    fn dispatch(&mut self) {
        for event in self.auctioneer.drain_events() {
            for trader in &mut self.traders {
                trader.on_event(&event);
            }
            for observer in &mut self.observers {
                observer.on_event(&event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use clearmarket_types::AuctioneerConfig;

    use super::*;

    /// Submits the same one-unit order every turn.
    struct Fixed {
        id: TraderId,
        bid: bool,
        price: f64,
        rejected: Rc<Cell<usize>>,
    }

    impl Trader for Fixed {
        fn id(&self) -> TraderId {
            self.id
        }

        fn act(&mut self, ctx: &mut RoundContext<'_>) -> Vec<TraderAction> {
            let request = if self.bid {
                ctx.bid(self.price, 1)
            } else {
                ctx.ask(self.price, 1)
            };
            vec![TraderAction::Submit(request)]
        }

        fn on_rejected(&mut self, _request: &OrderRequest, _error: &ClearmarketError) {
            self.rejected.set(self.rejected.get() + 1);
        }
    }

    struct Recorder(Rc<RefCell<Vec<&'static str>>>);

    impl MarketObserver for Recorder {
        fn on_event(&mut self, event: &MarketEvent) {
            self.0.borrow_mut().push(event.kind());
        }
    }

    fn fixed(market: &mut Market, bid: bool, price: f64) -> Box<Fixed> {
        Box::new(Fixed {
            id: market.ids().next_trader_id(),
            bid,
            price,
            rejected: Rc::new(Cell::new(0)),
        })
    }

    fn market(config: &AuctioneerConfig) -> Market {
        Market::new(Auctioneer::from_config(config).unwrap())
    }

    #[test]
    fn round_routes_orders_and_events() {
        let mut market = market(&AuctioneerConfig::continuous());
        let log = Rc::new(RefCell::new(Vec::new()));
        market.subscribe(Box::new(Recorder(Rc::clone(&log))));

        let seller = fixed(&mut market, false, 10.0);
        let buyer = fixed(&mut market, true, 12.0);
        market.register_trader(seller, Decimal::ZERO, 5).unwrap();
        market.register_trader(buyer, Decimal::new(100, 0), 0).unwrap();

        market.run_round().unwrap();
        let kinds = log.borrow().clone();
        assert!(kinds.contains(&"TRANSACTION_EXECUTED"));
        assert_eq!(kinds.last(), Some(&"ROUND_CLOSED"));
        assert_eq!(market.auctioneer().ledger().stock_of(TraderId(1)), 1);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut market = market(&AuctioneerConfig::continuous());
        let first = fixed(&mut market, true, 1.0);
        let again = Box::new(Fixed {
            id: first.id,
            bid: true,
            price: 1.0,
            rejected: Rc::new(Cell::new(0)),
        });
        market.register_trader(first, Decimal::ONE, 0).unwrap();
        assert!(matches!(
            market.register_trader(again, Decimal::ONE, 0),
            Err(ClearmarketError::DuplicateTrader(_))
        ));
        assert_eq!(market.trader_count(), 1);
    }

    #[test]
    fn rejected_order_does_not_stop_round() {
        let mut market = market(&AuctioneerConfig::clearing_house());
        let broken = fixed(&mut market, true, f64::NAN);
        let rejections = Rc::clone(&broken.rejected);
        let fine = fixed(&mut market, true, 5.0);
        market.register_trader(broken, Decimal::ONE, 0).unwrap();
        market.register_trader(fine, Decimal::ONE, 0).unwrap();

        market.run_round().unwrap();
        assert_eq!(rejections.get(), 1);
        assert_eq!(market.auctioneer().order_count(), 1);
    }

    #[test]
    fn failed_settlement_is_dispatched_and_round_goes_on() {
        let mut market = market(&AuctioneerConfig::continuous());
        let log = Rc::new(RefCell::new(Vec::new()));
        market.subscribe(Box::new(Recorder(Rc::clone(&log))));

        let seller = fixed(&mut market, false, 10.0);
        let broke = fixed(&mut market, true, 12.0);
        let rejections = Rc::clone(&broke.rejected);
        let rich = fixed(&mut market, true, 12.0);
        let rich_id = rich.id;
        market.register_trader(seller, Decimal::ZERO, 5).unwrap();
        market.register_trader(broke, Decimal::ONE, 0).unwrap();
        market.register_trader(rich, Decimal::new(100, 0), 0).unwrap();

        assert_eq!(market.run_round().unwrap(), 0);
        assert_eq!(rejections.get(), 1);
        assert_eq!(market.auctioneer().ledger().stock_of(rich_id), 1);

        let kinds = log.borrow().clone();
        let failed = kinds.iter().position(|k| *k == "SETTLEMENT_FAILED").unwrap();
        let traded = kinds.iter().position(|k| *k == "TRANSACTION_EXECUTED").unwrap();
        assert!(failed < traded);
        assert_eq!(kinds.last(), Some(&"ROUND_CLOSED"));
    }

    #[test]
    fn zero_rounds_per_day_rejected() {
        let cfg = MarketConfig {
            rounds_per_day: 0,
            ..MarketConfig::default()
        };
        assert!(Market::from_config(&cfg).is_err());
    }

    #[test]
    fn run_counts_days() {
        let cfg = MarketConfig {
            auctioneer: AuctioneerConfig::clearing_house(),
            rounds_per_day: 3,
            verify_supply_at_day_end: true,
        };
        let mut market = Market::from_config(&cfg).unwrap();
        let seller = fixed(&mut market, false, 10.0);
        let buyer = fixed(&mut market, true, 12.0);
        market.register_trader(seller, Decimal::ZERO, 100).unwrap();
        market.register_trader(buyer, Decimal::new(1_000, 0), 0).unwrap();

        let executed = market.run(2).unwrap();
        assert_eq!(executed, 6);
        assert_eq!(market.auctioneer().day(), 2);
        assert_eq!(market.auctioneer().ledger().stock_of(TraderId(1)), 6);
    }
}
