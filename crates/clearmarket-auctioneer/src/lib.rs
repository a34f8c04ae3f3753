//! # clearmarket-auctioneer
//!
//! **Auctioneers and the market facade.**
//!
//! Control flow for one order:
//! 1. A [`Trader`] returns a [`TraderAction::Submit`] from its turn
//! 2. The [`Market`] hands it to the [`Auctioneer`]
//! 3. The auctioneer validates it, applies acceptance policies and inserts
//!    it into the four-heap book
//! 4. If the clearing condition fires, matched pairs are priced and settled
//! 5. Queued events go back out to traders and observers

pub mod acceptance;
pub mod auctioneer;
pub mod clearing_condition;
pub mod market;

pub use auctioneer::{AuctionState, Auctioneer};
pub use clearing_condition::ClearingGate;
pub use market::{Market, MarketObserver, RoundContext, Trader, TraderAction};
