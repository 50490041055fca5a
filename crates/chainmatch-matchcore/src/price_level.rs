//! A single price level in the order book.
//!
//! Entries at the same price are kept in arrival order (time priority)
//! in a [`VecDeque`]; there is no pro-rata allocation.

use std::collections::VecDeque;

use chainmatch_types::{AccountId, LogicalTime, Order, OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The book's view of a resting order.
///
/// Carries exactly what matching needs; the full record (trade ids,
/// creation time, status) lives in the `OrderStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    pub order_id: OrderId,
    pub owner: AccountId,
    pub price: Decimal,
    pub remaining_qty: Decimal,
    pub expires_at: LogicalTime,
    /// Arrival sequence; strictly increasing along each level.
    pub sequence: u64,
}

impl BookEntry {
    #[must_use]
    pub fn is_expired_at(&self, now: LogicalTime) -> bool {
        self.expires_at < now
    }
}

impl From<&Order> for BookEntry {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            owner: order.owner,
            price: order.price,
            remaining_qty: order.remaining_qty,
            expires_at: order.expires_at,
            sequence: order.sequence,
        }
    }
}

/// All resting entries at one price, front = oldest = filled first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    entries: VecDeque<BookEntry>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            entries: VecDeque::new(),
        }
    }

    /// Add an entry at the back (lowest time priority).
    pub fn push_back(&mut self, entry: BookEntry) {
        debug_assert!(
            self.entries
                .back()
                .is_none_or(|last| last.sequence < entry.sequence),
            "entries must arrive in sequence order"
        );
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<BookEntry> {
        self.entries.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<&BookEntry> {
        self.entries.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut BookEntry> {
        self.entries.front_mut()
    }

    /// Remove a specific entry by order id.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<BookEntry> {
        let pos = self.entries.iter().position(|e| e.order_id == *order_id)?;
        self.entries.remove(pos)
    }

    /// Total remaining quantity resting at this price.
    #[must_use]
    pub fn total_quantity(&self) -> Decimal {
        self.entries.iter().map(|e| e.remaining_qty).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
