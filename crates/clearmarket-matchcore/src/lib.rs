//! # clearmarket-matchcore
//!
//! **Four-heap order book and pricing for the clearmarket kernel.**
//!
//! This is the compute plane: it keeps orders partitioned into matched and
//! unmatched sets and prices matched pairs. It has:
//!
//! - **No settlement**: funds and stock live in `clearmarket-settlement`
//! - **Deterministic output**: the same order flow gives the same matches
//! - **Incremental matching**: each insertion moves only boundary fragments

pub mod determinism;
pub mod orderbook;
pub mod partition;
pub mod pricing;

pub use determinism::{compute_transaction_root, transaction_root_hex, verify_transaction_root};
pub use orderbook::{MatchedPair, MatchedPairs, OrderBook};
pub use partition::{Fragment, Partition, PriceOrder, TimeOrder};
pub use pricing::{PricingPolicy, determine_price, uniform_price, within_bounds};
