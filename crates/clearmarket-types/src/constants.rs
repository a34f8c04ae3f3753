//! System-wide constants for the clearmarket kernel.

use rust_decimal::Decimal;

/// Decimal places kept when converting a submitted `f64` price.
pub const PRICE_PRECISION: u32 = 8;

/// Default `k` for k-pricing: the midpoint between bid and ask.
pub const DEFAULT_K: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Default number of trading rounds in one day.
pub const DEFAULT_ROUNDS_PER_DAY: u32 = 10;
