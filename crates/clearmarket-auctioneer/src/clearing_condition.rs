//! Decides when the auctioneer clears.

use clearmarket_types::ClearingCondition;

/// Stateful wrapper around a [`ClearingCondition`].
#[derive(Debug, Clone)]
pub struct ClearingGate {
    condition: ClearingCondition,
    orders_since_clear: u32,
}

impl ClearingGate {
    #[must_use]
    pub fn new(condition: ClearingCondition) -> Self {
        Self {
            condition,
            orders_since_clear: 0,
        }
    }

    #[must_use]
    pub fn condition(&self) -> ClearingCondition {
        self.condition
    }

    /// Note an accepted order; returns whether to clear now.
    pub fn on_order(&mut self) -> bool {
        match self.condition {
            ClearingCondition::EveryOrder => true,
            ClearingCondition::EveryNOrders(n) => {
                self.orders_since_clear += 1;
                if self.orders_since_clear >= n {
                    self.orders_since_clear = 0;
                    true
                } else {
                    false
                }
            }
            ClearingCondition::EveryRound | ClearingCondition::Manual => false,
        }
    }

    /// Whether to clear at the end of a round.
    #[must_use]
    pub fn on_round(&self) -> bool {
        self.condition == ClearingCondition::EveryRound
    }

    pub fn reset(&mut self) {
        self.orders_since_clear = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_order_fires_each_time() {
        let mut gate = ClearingGate::new(ClearingCondition::EveryOrder);
        assert!(gate.on_order());
        assert!(gate.on_order());
        assert!(!gate.on_round());
    }

    #[test]
    fn every_round_fires_only_on_round() {
        let mut gate = ClearingGate::new(ClearingCondition::EveryRound);
        assert!(!gate.on_order());
        assert!(gate.on_round());
    }

    #[test]
    fn every_n_orders_counts() {
        let mut gate = ClearingGate::new(ClearingCondition::EveryNOrders(3));
        let fired: Vec<bool> = (0..7).map(|_| gate.on_order()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
        gate.reset();
        assert!(!gate.on_order());
        assert!(!gate.on_order());
        assert!(gate.on_order());
    }

    #[test]
    fn manual_never_fires() {
        let mut gate = ClearingGate::new(ClearingCondition::Manual);
        assert!(!gate.on_order());
        assert!(!gate.on_round());
    }
}
