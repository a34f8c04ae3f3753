//! Admission rules applied after basic validation.

use clearmarket_types::{AcceptancePolicy, ClearmarketError, MarketQuote, Order, OrderSide, Result};

/// Apply `policies` in order; the first failure wins.
///
/// # Errors
/// [`ClearmarketError::NotAnImprovement`] or
/// [`ClearmarketError::OutsidePriceBand`].
pub fn check_all(policies: &[AcceptancePolicy], order: &Order, quote: &MarketQuote) -> Result<()> {
    policies.iter().try_for_each(|policy| check(policy, order, quote))
}

/// Apply one policy.
///
/// # Errors
/// As [`check_all`].
pub fn check(policy: &AcceptancePolicy, order: &Order, quote: &MarketQuote) -> Result<()> {
    match *policy {
        AcceptancePolicy::BeatQuote => beat_quote(order, quote),
        AcceptancePolicy::PriceBand { floor, ceiling } => {
            if order.price < floor || order.price > ceiling {
                return Err(ClearmarketError::OutsidePriceBand {
                    price: order.price,
                    floor,
                    ceiling,
                });
            }
            Ok(())
        }
    }
}

/// A bid must not fall below the bid quote, an ask must not rise above the
/// ask quote. An open quote side accepts anything. Matching the quote
/// exactly is allowed.
fn beat_quote(order: &Order, quote: &MarketQuote) -> Result<()> {
    let worse = match order.side {
        OrderSide::Bid => quote.bid.is_some_and(|bid| order.price < bid),
        OrderSide::Ask => quote.ask.is_some_and(|ask| order.price > ask),
    };
    if worse {
        return Err(ClearmarketError::NotAnImprovement {
            side: order.side,
            price: order.price,
            quote: *quote,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn order(side: OrderSide, price: i64) -> Order {
        Order::dummy(side, dec(price), 1, 0)
    }

    #[test]
    fn open_quote_accepts_everything() {
        let q = MarketQuote::OPEN;
        assert!(check(&AcceptancePolicy::BeatQuote, &order(OrderSide::Bid, 1), &q).is_ok());
        assert!(check(&AcceptancePolicy::BeatQuote, &order(OrderSide::Ask, 999), &q).is_ok());
    }

    #[test]
    fn bid_below_bid_quote_rejected() {
        let q = MarketQuote::new(Some(dec(15)), Some(dec(10)));
        let err = check(&AcceptancePolicy::BeatQuote, &order(OrderSide::Bid, 9), &q).unwrap_err();
        assert!(matches!(
            err,
            ClearmarketError::NotAnImprovement { side: OrderSide::Bid, .. }
        ));
        assert!(check(&AcceptancePolicy::BeatQuote, &order(OrderSide::Bid, 10), &q).is_ok());
    }

    #[test]
    fn ask_above_ask_quote_rejected() {
        let q = MarketQuote::new(Some(dec(15)), Some(dec(10)));
        assert!(check(&AcceptancePolicy::BeatQuote, &order(OrderSide::Ask, 16), &q).is_err());
        assert!(check(&AcceptancePolicy::BeatQuote, &order(OrderSide::Ask, 15), &q).is_ok());
    }

    #[test]
    fn price_band_is_inclusive() {
        let band = AcceptancePolicy::PriceBand {
            floor: dec(5),
            ceiling: dec(50),
        };
        let q = MarketQuote::OPEN;
        assert!(check(&band, &order(OrderSide::Bid, 5), &q).is_ok());
        assert!(check(&band, &order(OrderSide::Ask, 50), &q).is_ok());
        assert!(matches!(
            check(&band, &order(OrderSide::Ask, 51), &q),
            Err(ClearmarketError::OutsidePriceBand { .. })
        ));
    }

    #[test]
    fn first_failing_policy_reported() {
        let policies = [
            AcceptancePolicy::PriceBand {
                floor: dec(0),
                ceiling: dec(20),
            },
            AcceptancePolicy::BeatQuote,
        ];
        let q = MarketQuote::new(Some(dec(15)), Some(dec(10)));
        let err = check_all(&policies, &order(OrderSide::Bid, 30), &q).unwrap_err();
        assert!(matches!(err, ClearmarketError::OutsidePriceBand { .. }));
        assert!(check_all(&policies, &order(OrderSide::Bid, 12), &q).is_ok());
    }
}
