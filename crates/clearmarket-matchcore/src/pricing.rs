//! Pricing policies: turn a matched (bid, ask) pair into a clearing price.
//!
//! Every price returned lies in `[ask.price, bid.price]`. When the rule
//! cannot produce one, the configured [`PriceFallback`] decides; a fallback
//! that lands outside the pair's bounds means no trade.

use clearmarket_types::{
    ClearmarketError, MarketQuote, Order, PriceFallback, PricingConfig, PricingRule, Result,
};
use rust_decimal::Decimal;

/// Apply `rule` to one pair. `quote` is the snapshot taken when the clearing
/// event started; only the uniform rule reads it.
#[must_use]
pub fn determine_price(
    rule: &PricingRule,
    bid: &Order,
    ask: &Order,
    quote: &MarketQuote,
) -> Option<Decimal> {
    let price = match *rule {
        PricingRule::Discriminatory { k } => blend(k, bid.price, ask.price),
        PricingRule::Uniform { k } => uniform_price(k, quote),
    }?;
    within_bounds(price, bid, ask)
}

/// `k * quote.bid + (1 - k) * quote.ask`, if both quote sides are set.
#[must_use]
pub fn uniform_price(k: Decimal, quote: &MarketQuote) -> Option<Decimal> {
    match (quote.bid, quote.ask) {
        (Some(bid), Some(ask)) => blend(k, bid, ask),
        _ => None,
    }
}

/// `None` only if an intermediate product leaves the `Decimal` range.
fn blend(k: Decimal, high: Decimal, low: Decimal) -> Option<Decimal> {
    k.checked_mul(high)?
        .checked_add((Decimal::ONE - k).checked_mul(low)?)
}

/// `Some(price)` when `ask.price <= price <= bid.price`.
#[must_use]
pub fn within_bounds(price: Decimal, bid: &Order, ask: &Order) -> Option<Decimal> {
    (ask.price <= price && price <= bid.price).then_some(price)
}

/// A pricing rule with its fallback and the last transaction price.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    config: PricingConfig,
    last_price: Option<Decimal>,
}

impl PricingPolicy {
    /// # Errors
    /// [`ClearmarketError::Configuration`] if `k` is outside `[0, 1]`.
    pub fn new(config: PricingConfig) -> Result<Self> {
        let k = config.rule.k();
        if k < Decimal::ZERO || k > Decimal::ONE {
            return Err(ClearmarketError::Configuration(format!(
                "k must lie in [0, 1], got {k}"
            )));
        }
        Ok(Self {
            config,
            last_price: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    #[must_use]
    pub fn is_uniform(&self) -> bool {
        matches!(self.config.rule, PricingRule::Uniform { .. })
    }

    /// Price one pair, falling back when the rule yields nothing.
    #[must_use]
    pub fn price_pair(&self, bid: &Order, ask: &Order, quote: &MarketQuote) -> Option<Decimal> {
        determine_price(&self.config.rule, bid, ask, quote).or_else(|| {
            let fallback = match self.config.fallback {
                PriceFallback::NoTrade => None,
                PriceFallback::PreviousPrice => self.last_price,
                PriceFallback::FiniteQuoteSide => quote.bid.or(quote.ask),
            }?;
            tracing::debug!(
                fallback = ?self.config.fallback,
                price = %fallback,
                "Pricing rule gave no price, trying fallback"
            );
            within_bounds(fallback, bid, ask)
        })
    }

    /// The single price of a uniform clearing event, before per-pair bound
    /// checks. `None` for discriminatory rules.
    #[must_use]
    pub fn uniform_price(&self, quote: &MarketQuote) -> Option<Decimal> {
        match self.config.rule {
            PricingRule::Uniform { k } => uniform_price(k, quote),
            PricingRule::Discriminatory { .. } => None,
        }
    }

    /// Remember the price of an executed transaction.
    pub fn record(&mut self, price: Decimal) {
        self.last_price = Some(price);
    }

    #[must_use]
    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    pub fn reset(&mut self) {
        self.last_price = None;
    }
}
