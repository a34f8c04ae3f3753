//! One of the four order-book partitions.
//!
//! A partition is a priority-ordered set of [`Fragment`]s, stored in a
//! `BTreeMap` keyed so that the first entry is always the next one to move
//! across the partition boundary. Price direction and time direction are
//! chosen per partition:
//!
//! | partition       | price            | time          |
//! |-----------------|------------------|---------------|
//! | unmatched bids  | highest first    | earliest first |
//! | unmatched asks  | lowest first     | earliest first |
//! | matched bids    | lowest first     | latest first  |
//! | matched asks    | highest first    | latest first  |

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use clearmarket_types::{Order, OrderId};
use rust_decimal::Decimal;

/// Direction of the price component of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceOrder {
    LowestFirst,
    HighestFirst,
}

/// Direction of the arrival-time component of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOrder {
    EarliestFirst,
    LatestFirst,
}

/// Some units of one order sitting in one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub order_id: OrderId,
    pub price: Decimal,
    pub sequence: u64,
    pub quantity: u64,
}

impl Fragment {
    /// Fragment covering `quantity` units of `order`.
    #[must_use]
    pub fn of(order: &Order, quantity: u64) -> Self {
        Self {
            order_id: order.id,
            price: order.price,
            sequence: order.sequence,
            quantity,
        }
    }

    /// Split `quantity` units off this fragment, leaving the rest behind.
    #[must_use]
    pub fn split_off(&mut self, quantity: u64) -> Self {
        let taken = quantity.min(self.quantity);
        self.quantity -= taken;
        Self {
            quantity: taken,
            ..self.clone()
        }
    }
}

type Key = (Decimal, u64, u64);

/// Priority-ordered fragments of one side and one matched/unmatched state.
#[derive(Debug, Clone)]
pub struct Partition {
    price_order: PriceOrder,
    time_order: TimeOrder,
    fragments: BTreeMap<Key, Fragment>,
    total_quantity: u64,
}

impl Partition {
    #[must_use]
    pub fn new(price_order: PriceOrder, time_order: TimeOrder) -> Self {
        Self {
            price_order,
            time_order,
            fragments: BTreeMap::new(),
            total_quantity: 0,
        }
    }

    fn key(&self, price: Decimal, sequence: u64, order_id: OrderId) -> Key {
        let price = match self.price_order {
            PriceOrder::LowestFirst => price,
            PriceOrder::HighestFirst => -price,
        };
        let time = match self.time_order {
            TimeOrder::EarliestFirst => sequence,
            TimeOrder::LatestFirst => u64::MAX - sequence,
        };
        let tie = match self.time_order {
            TimeOrder::EarliestFirst => order_id.0,
            TimeOrder::LatestFirst => u64::MAX - order_id.0,
        };
        (price, time, tie)
    }

    /// Add a fragment. Units of an order already present are merged.
    ///
    /// The book keeps each side's units within `u64`, so the totals here
    /// cannot overflow.
    pub fn insert(&mut self, fragment: Fragment) {
        if fragment.quantity == 0 {
            return;
        }
        let key = self.key(fragment.price, fragment.sequence, fragment.order_id);
        self.total_quantity += fragment.quantity;
        self.fragments
            .entry(key)
            .and_modify(|f| f.quantity += fragment.quantity)
            .or_insert(fragment);
    }

    /// The next fragment to leave this partition.
    #[must_use]
    pub fn front(&self) -> Option<&Fragment> {
        self.fragments.values().next()
    }

    /// The fragment furthest from the boundary.
    #[must_use]
    pub fn back(&self) -> Option<&Fragment> {
        self.fragments.values().next_back()
    }

    /// Take up to `max_quantity` units from the front fragment.
    pub fn take_front(&mut self, max_quantity: u64) -> Option<Fragment> {
        let mut entry = self.fragments.first_entry()?;
        let taken = if entry.get().quantity <= max_quantity {
            entry.remove()
        } else {
            entry.get_mut().split_off(max_quantity)
        };
        self.total_quantity -= taken.quantity;
        Some(taken)
    }

    /// Take up to `max_quantity` units from the back fragment.
    pub fn take_back(&mut self, max_quantity: u64) -> Option<Fragment> {
        let mut entry = self.fragments.last_entry()?;
        let taken = if entry.get().quantity <= max_quantity {
            entry.remove()
        } else {
            entry.get_mut().split_off(max_quantity)
        };
        self.total_quantity -= taken.quantity;
        Some(taken)
    }

    /// Take up to `max_quantity` units of `order`, wherever it sits.
    pub fn take_order(&mut self, order: &Order, max_quantity: u64) -> Option<Fragment> {
        let key = self.key(order.price, order.sequence, order.id);
        let Entry::Occupied(mut entry) = self.fragments.entry(key) else {
            return None;
        };
        let taken = if entry.get().quantity <= max_quantity {
            entry.remove()
        } else {
            entry.get_mut().split_off(max_quantity)
        };
        self.total_quantity -= taken.quantity;
        Some(taken)
    }

    /// Remove every unit of `order` held here.
    pub fn remove(&mut self, order: &Order) -> Option<Fragment> {
        let key = self.key(order.price, order.sequence, order.id);
        let removed = self.fragments.remove(&key)?;
        self.total_quantity -= removed.quantity;
        Some(removed)
    }

    /// Units of `order` held here.
    #[must_use]
    pub fn quantity_of(&self, order: &Order) -> u64 {
        let key = self.key(order.price, order.sequence, order.id);
        self.fragments.get(&key).map_or(0, |f| f.quantity)
    }

    /// Fragments from the boundary inwards.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Fragment> {
        self.fragments.values()
    }

    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.total_quantity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.total_quantity = 0;
    }
}

#[cfg(test)]
mod tests {
    use clearmarket_types::OrderSide;

    use super::*;

    fn order(price: i64, qty: u64, seq: u64) -> Order {
        Order::dummy(OrderSide::Ask, Decimal::new(price, 0), qty, seq)
    }

    fn fragment(price: i64, qty: u64, seq: u64) -> Fragment {
        Fragment::of(&order(price, qty, seq), qty)
    }

    #[test]
    fn lowest_first_earliest_first() {
        let mut p = Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst);
        p.insert(fragment(11, 1, 0));
        p.insert(fragment(10, 1, 2));
        p.insert(fragment(10, 1, 1));
        let seqs: Vec<u64> = p.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 0]);
        assert_eq!(p.total_quantity(), 3);
    }

    #[test]
    fn highest_first_latest_first() {
        let mut p = Partition::new(PriceOrder::HighestFirst, TimeOrder::LatestFirst);
        p.insert(fragment(10, 1, 0));
        p.insert(fragment(12, 1, 1));
        p.insert(fragment(12, 1, 2));
        let seqs: Vec<u64> = p.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![2, 1, 0]);
        assert_eq!(p.back().unwrap().sequence, 0);
    }

    #[test]
    fn insert_merges_same_order() {
        let mut p = Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst);
        p.insert(fragment(10, 2, 0));
        p.insert(fragment(10, 3, 0));
        assert_eq!(p.len(), 1);
        assert_eq!(p.front().unwrap().quantity, 5);
        assert_eq!(p.total_quantity(), 5);
    }

    #[test]
    fn take_front_splits() {
        let mut p = Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst);
        p.insert(fragment(10, 5, 0));
        let taken = p.take_front(2).unwrap();
        assert_eq!(taken.quantity, 2);
        assert_eq!(p.front().unwrap().quantity, 3);
        assert_eq!(p.total_quantity(), 3);

        let rest = p.take_front(10).unwrap();
        assert_eq!(rest.quantity, 3);
        assert!(p.is_empty());
        assert!(p.take_front(1).is_none());
    }

    #[test]
    fn take_back_splits() {
        let mut p = Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst);
        p.insert(fragment(10, 1, 0));
        p.insert(fragment(20, 4, 1));
        let taken = p.take_back(3).unwrap();
        assert_eq!(taken.price, Decimal::new(20, 0));
        assert_eq!(taken.quantity, 3);
        assert_eq!(p.total_quantity(), 2);
    }

    #[test]
    fn remove_and_quantity_of() {
        let mut p = Partition::new(PriceOrder::HighestFirst, TimeOrder::EarliestFirst);
        let o = order(10, 4, 7);
        p.insert(Fragment::of(&o, 4));
        assert_eq!(p.quantity_of(&o), 4);
        let removed = p.remove(&o).unwrap();
        assert_eq!(removed.quantity, 4);
        assert_eq!(p.quantity_of(&o), 0);
        assert!(p.remove(&o).is_none());
        assert_eq!(p.total_quantity(), 0);
    }

    #[test]
    fn take_order_from_the_middle() {
        let mut p = Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst);
        let middle = order(11, 4, 1);
        p.insert(fragment(10, 1, 0));
        p.insert(Fragment::of(&middle, 4));
        p.insert(fragment(12, 1, 2));

        let taken = p.take_order(&middle, 3).unwrap();
        assert_eq!(taken.quantity, 3);
        assert_eq!(p.quantity_of(&middle), 1);
        assert_eq!(p.total_quantity(), 3);

        assert_eq!(p.take_order(&middle, 5).unwrap().quantity, 1);
        assert!(p.take_order(&middle, 1).is_none());
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn zero_quantity_fragment_ignored() {
        let mut p = Partition::new(PriceOrder::LowestFirst, TimeOrder::EarliestFirst);
        p.insert(fragment(10, 0, 0));
        assert!(p.is_empty());
    }
}
