//! # clearmarket-types
//!
//! Shared types, errors, and configuration for the **clearmarket**
//! double-auction kernel.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`TraderId`], [`TransactionId`], [`IdAllocator`]
//! - **Order model**: [`Order`], [`OrderRequest`], [`OrderSide`]
//! - **Quote**: [`MarketQuote`]
//! - **Trade model**: [`Transaction`]
//! - **Events**: [`MarketEvent`]
//! - **Configuration**: [`AuctioneerConfig`], [`PricingConfig`], [`MarketConfig`]
//! - **Errors**: [`ClearmarketError`] with `CM_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod order;
pub mod quote;
pub mod transaction;

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use order::*;
pub use quote::*;
pub use transaction::*;

// Constants are accessed via `clearmarket_types::constants::FOO`.
