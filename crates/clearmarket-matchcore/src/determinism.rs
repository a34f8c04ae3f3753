//! Reproducibility digest over executed transactions.
//!
//! Replaying the same order flow through the same configuration must yield
//! the same transactions. The transaction root is a SHA-256 hash that lets
//! two runs be compared without diffing full payloads.

use clearmarket_types::Transaction;
use sha2::{Digest, Sha256};

/// Hash the transactions of one round, in execution order.
///
/// Covers ids, orders, traders, prices, charges and quantity. The wall-clock
/// `executed_at` stamp is excluded.
#[must_use]
pub fn compute_transaction_root(transactions: &[Transaction]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"clearmarket:transaction_root:v1:");
    hasher.update((transactions.len() as u64).to_le_bytes());

    for tx in transactions {
        hasher.update(tx.id.0.as_bytes());
        hasher.update(tx.day.to_le_bytes());
        hasher.update(tx.round.to_le_bytes());
        hasher.update(tx.bid_order.0.to_le_bytes());
        hasher.update(tx.ask_order.0.to_le_bytes());
        hasher.update(tx.buyer.0.to_le_bytes());
        hasher.update(tx.seller.0.to_le_bytes());
        hasher.update(tx.price.normalize().to_string().as_bytes());
        hasher.update(tx.seller_price.normalize().to_string().as_bytes());
        hasher.update(tx.quantity.to_le_bytes());
        hasher.update(tx.buyer_charge.normalize().to_string().as_bytes());
        hasher.update(tx.seller_payment.normalize().to_string().as_bytes());
    }

    hasher.finalize().into()
}

/// Hex form, as carried on `RoundClosed`.
#[must_use]
pub fn transaction_root_hex(transactions: &[Transaction]) -> String {
    hex::encode(compute_transaction_root(transactions))
}

#[must_use]
pub fn verify_transaction_root(transactions: &[Transaction], expected_root: &[u8; 32]) -> bool {
    compute_transaction_root(transactions) == *expected_root
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use clearmarket_types::{OrderId, TraderId, TransactionId};
    use rust_decimal::Decimal;

    use super::*;

    fn make_transaction(round: u32, fill_seq: u64) -> Transaction {
        let price = Decimal::new(11, 0);
        Transaction {
            id: TransactionId::deterministic(0, round, fill_seq),
            day: 0,
            round,
            bid_order: OrderId(1),
            ask_order: OrderId(2),
            buyer: TraderId(1),
            seller: TraderId(2),
            price,
            seller_price: price,
            quantity: 3,
            buyer_charge: price * Decimal::from(3),
            seller_payment: price * Decimal::from(3),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn empty_root_is_stable() {
        assert_eq!(compute_transaction_root(&[]), compute_transaction_root(&[]));
    }

    #[test]
    fn order_matters() {
        let a = make_transaction(0, 0);
        let b = make_transaction(0, 1);
        assert_ne!(
            compute_transaction_root(&[a.clone(), b.clone()]),
            compute_transaction_root(&[b, a])
        );
    }

    #[test]
    fn timestamp_is_not_hashed() {
        let a = make_transaction(2, 0);
        let mut later = a.clone();
        later.executed_at += Duration::seconds(30);
        assert_eq!(compute_transaction_root(&[a]), compute_transaction_root(&[later]));
    }

    #[test]
    fn trailing_zeros_do_not_change_root() {
        let a = make_transaction(0, 0);
        let mut rescaled = a.clone();
        rescaled.price = Decimal::new(1100, 2);
        assert_eq!(compute_transaction_root(&[a]), compute_transaction_root(&[rescaled]));
    }

    #[test]
    fn verify_and_hex() {
        let txs = vec![make_transaction(0, 0)];
        let root = compute_transaction_root(&txs);
        assert!(verify_transaction_root(&txs, &root));
        assert!(!verify_transaction_root(&txs, &[0xAB; 32]));
        let hex_root = transaction_root_hex(&txs);
        assert_eq!(hex_root.len(), 64);
        assert_eq!(hex_root, hex::encode(root));
    }
}
