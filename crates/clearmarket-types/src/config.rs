//! Configuration types for auctioneers and markets.
//!
//! An [`AuctioneerConfig`] fully describes an auctioneer: building one from
//! the same config always yields an identical fresh instance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ClearmarketError, Result, constants};

/// The clearing rule, chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionRule {
    /// Continuous double auction: clears after every accepted order.
    Continuous,
    /// Clearing house: accumulates orders and clears once per round.
    ClearingHouse,
    /// McAfee's truthful double auction, cleared once per round.
    McAfee,
}

impl std::fmt::Display for AuctionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => write!(f, "CDA"),
            Self::ClearingHouse => write!(f, "CH"),
            Self::McAfee => write!(f, "MCAFEE"),
        }
    }
}

/// How a matched pair is turned into a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingRule {
    /// `k * bid + (1 - k) * ask`, per pair.
    Discriminatory { k: Decimal },
    /// `k * quote.bid + (1 - k) * quote.ask`, once per clearing event.
    Uniform { k: Decimal },
}

impl PricingRule {
    #[must_use]
    pub fn k(&self) -> Decimal {
        match self {
            Self::Discriminatory { k } | Self::Uniform { k } => *k,
        }
    }
}

impl Default for PricingRule {
    fn default() -> Self {
        Self::Discriminatory {
            k: constants::DEFAULT_K,
        }
    }
}

/// What to do when the pricing rule cannot produce a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceFallback {
    /// Do not trade.
    #[default]
    NoTrade,
    /// Reuse the previous transaction price.
    PreviousPrice,
    /// Use whichever side of the quote is finite.
    FiniteQuoteSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub rule: PricingRule,
    #[serde(default)]
    pub fallback: PriceFallback,
}

/// When the auctioneer clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearingCondition {
    /// After every accepted order.
    EveryOrder,
    /// At the end of every round.
    EveryRound,
    /// After every `n`th accepted order.
    EveryNOrders(u32),
    /// Only on an explicit `clear()` call.
    Manual,
}

/// Extra admission rules beyond basic validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptancePolicy {
    /// A new order must not be worse than the current same-side quote.
    BeatQuote,
    /// Prices must lie in `[floor, ceiling]`.
    PriceBand { floor: Decimal, ceiling: Decimal },
}

/// Whether the auctioneer exposes its unmatched orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BookVisibility {
    #[default]
    Transparent,
    Sealed,
}

/// Full description of an auctioneer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctioneerConfig {
    pub rule: AuctionRule,
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Overrides the rule's default clearing condition.
    #[serde(default)]
    pub clearing: Option<ClearingCondition>,
    #[serde(default)]
    pub acceptance: Vec<AcceptancePolicy>,
    #[serde(default)]
    pub visibility: BookVisibility,
}

impl AuctioneerConfig {
    /// Continuous double auction with k = 0.5 discriminatory pricing.
    #[must_use]
    pub fn continuous() -> Self {
        Self {
            rule: AuctionRule::Continuous,
            pricing: PricingConfig::default(),
            clearing: None,
            acceptance: Vec::new(),
            visibility: BookVisibility::Transparent,
        }
    }

    /// Clearing house with k = 0.5 uniform pricing.
    #[must_use]
    pub fn clearing_house() -> Self {
        Self {
            rule: AuctionRule::ClearingHouse,
            pricing: PricingConfig {
                rule: PricingRule::Uniform {
                    k: constants::DEFAULT_K,
                },
                fallback: PriceFallback::NoTrade,
            },
            clearing: None,
            acceptance: Vec::new(),
            visibility: BookVisibility::Transparent,
        }
    }

    /// McAfee double auction; sealed-bid.
    #[must_use]
    pub fn mcafee() -> Self {
        Self {
            rule: AuctionRule::McAfee,
            pricing: PricingConfig::default(),
            clearing: None,
            acceptance: Vec::new(),
            visibility: BookVisibility::Sealed,
        }
    }

    /// The clearing condition in force: the override if set, else the
    /// rule's default.
    #[must_use]
    pub fn effective_clearing(&self) -> ClearingCondition {
        self.clearing.unwrap_or(match self.rule {
            AuctionRule::Continuous => ClearingCondition::EveryOrder,
            AuctionRule::ClearingHouse | AuctionRule::McAfee => ClearingCondition::EveryRound,
        })
    }

    /// Reject inconsistent settings.
    ///
    /// # Errors
    /// [`ClearmarketError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let k = self.pricing.rule.k();
        if k < Decimal::ZERO || k > Decimal::ONE {
            return Err(ClearmarketError::Configuration(format!(
                "k must lie in [0, 1], got {k}"
            )));
        }
        if self.clearing == Some(ClearingCondition::EveryNOrders(0)) {
            return Err(ClearmarketError::Configuration(
                "EveryNOrders needs n >= 1".to_string(),
            ));
        }
        for policy in &self.acceptance {
            match policy {
                AcceptancePolicy::BeatQuote if self.rule != AuctionRule::Continuous => {
                    return Err(ClearmarketError::Configuration(format!(
                        "BeatQuote requires the continuous rule, got {}",
                        self.rule
                    )));
                }
                AcceptancePolicy::PriceBand { floor, ceiling }
                    if *floor < Decimal::ZERO || floor > ceiling =>
                {
                    return Err(ClearmarketError::Configuration(format!(
                        "invalid price band [{floor}, {ceiling}]"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for AuctioneerConfig {
    fn default() -> Self {
        Self::continuous()
    }
}

/// Settings of the market facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub auctioneer: AuctioneerConfig,
    pub rounds_per_day: u32,
    /// Check funds and stock conservation whenever a day closes.
    pub verify_supply_at_day_end: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            auctioneer: AuctioneerConfig::default(),
            rounds_per_day: constants::DEFAULT_ROUNDS_PER_DAY,
            verify_supply_at_day_end: true,
        }
    }
}
