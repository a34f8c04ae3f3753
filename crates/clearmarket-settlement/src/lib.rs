//! # clearmarket-settlement
//!
//! **Settlement plane**: funds accounts, commodity holdings and the atomic
//! transfer that executes a cleared pair.
//!
//! The auctioneer hands each priced pair to [`Ledger::settle`], which:
//! 1. Checks sides, quantity and both traders
//! 2. Checks the seller's stock and the buyer's funds
//! 3. Moves stock seller -> buyer and funds buyer -> seller
//! 4. Credits any charge/payment difference to the house account
//!
//! [`SupplyConservation`] confirms that funds and stock are never created or
//! destroyed along the way.

pub mod account;
pub mod ledger;
pub mod supply_conservation;

pub use account::{Account, AccountKind, CommodityHolding};
pub use ledger::{Ledger, Receipt};
pub use supply_conservation::{Supply, SupplyConservation};
