//! Identifiers used throughout clearmarket.
//!
//! Order and trader ids are plain counters handed out by an [`IdAllocator`]
//! owned by the simulation context. Transaction ids are derived from the
//! clearing position so that replaying a simulation reproduces them exactly.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Identifier of a single order (shout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TraderId
// ---------------------------------------------------------------------------

/// Identifier of a market participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TraderId(pub u64);

impl TraderId {
    /// Owner of the auctioneer's own clearing account. Never allocated.
    pub const HOUSE: Self = Self(u64::MAX);
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trader:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TransactionId
// ---------------------------------------------------------------------------

/// Identifier of an executed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    /// Deterministic id from the trading day, round and fill sequence.
    ///
    /// The same clearing position always yields the same id, so two runs of
    /// the same simulation produce identical transaction logs.
    #[must_use]
    pub fn deterministic(day: u32, round: u32, fill_sequence: u64) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"clearmarket:transaction_id:v1:");
        hasher.update(day.to_le_bytes());
        hasher.update(round.to_le_bytes());
        hasher.update(fill_sequence.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// First eight hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// Monotonic id source owned by one simulation.
///
/// Each market (or test) creates its own allocator; nothing is shared
/// between simulations.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next_order: u64,
    next_trader: u64,
}

impl IdAllocator {
    /// Create an allocator starting at zero for both counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next order id.
    pub fn next_order_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order);
        self.next_order += 1;
        id
    }

    /// Allocate the next trader id.
    pub fn next_trader_id(&mut self) -> TraderId {
        let id = TraderId(self.next_trader);
        self.next_trader += 1;
        id
    }

    /// Number of order ids handed out so far.
    #[must_use]
    pub fn orders_allocated(&self) -> u64 {
        self.next_order
    }
}
