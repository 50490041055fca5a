//! The order book for a single asset.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>`, highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>`, lowest price first
//!
//! Within a level entries are FIFO by arrival sequence. An auxiliary
//! `HashMap<OrderId, (OrderSide, Decimal)>` gives O(log N) removal by id.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chainmatch_types::{AssetId, ChainmatchError, OrderId, OrderSide, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::price_level::{BookEntry, PriceLevel};

/// Aggregated quantity at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
    pub orders: usize,
}

/// Persistable form of a book: every entry per side in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub asset_id: AssetId,
    pub bids: Vec<BookEntry>,
    pub asks: Vec<BookEntry>,
}

/// Bids and asks for one base asset.
#[derive(Debug)]
pub struct OrderBook {
    pub asset_id: AssetId,
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    index: HashMap<OrderId, (OrderSide, Decimal)>,
}

impl OrderBook {
    #[must_use]
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Insert an entry at the back of its price level.
    pub fn insert(&mut self, side: OrderSide, entry: BookEntry) -> Result<()> {
        if self.index.contains_key(&entry.order_id) {
            return Err(ChainmatchError::DuplicateOrder(entry.order_id));
        }
        if entry.remaining_qty <= Decimal::ZERO {
            return Err(ChainmatchError::validation(
                "cannot rest an order with no remaining quantity",
            ));
        }

        let price = entry.price;
        self.index.insert(entry.order_id, (side, price));
        tracing::trace!(asset = %self.asset_id, order_id = %entry.order_id, %side, %price, "Book insert");

        match side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(entry),
            OrderSide::Sell => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(entry),
        }
        Ok(())
    }

    // =================================================================
    // Top of book
    // =================================================================

    /// Highest-priority entry on `side`, or `None` if that side is empty.
    #[must_use]
    pub fn peek_top(&self, side: OrderSide) -> Option<&BookEntry> {
        match side {
            OrderSide::Buy => self.bids.values().next().and_then(PriceLevel::front),
            OrderSide::Sell => self.asks.values().next().and_then(PriceLevel::front),
        }
    }

    /// Remove and return the highest-priority entry on `side`.
    pub fn remove_top(&mut self, side: OrderSide) -> Option<BookEntry> {
        let entry = match side {
            OrderSide::Buy => {
                let mut level = self.bids.first_entry()?;
                let entry = level.get_mut().pop_front();
                if level.get().is_empty() {
                    level.remove();
                }
                entry
            }
            OrderSide::Sell => {
                let mut level = self.asks.first_entry()?;
                let entry = level.get_mut().pop_front();
                if level.get().is_empty() {
                    level.remove();
                }
                entry
            }
        }?;
        self.index.remove(&entry.order_id);
        Some(entry)
    }

    /// Reduce the top entry on `side` by `qty` without removing it.
    ///
    /// # Errors
    /// `Validation` if the side is empty or `qty` would not leave a
    /// positive remainder (a full fill must go through [`Self::remove_top`]).
    pub fn reduce_top(&mut self, side: OrderSide, qty: Decimal) -> Result<&BookEntry> {
        let level = match side {
            OrderSide::Buy => self.bids.values_mut().next(),
            OrderSide::Sell => self.asks.values_mut().next(),
        }
        .ok_or_else(|| ChainmatchError::validation(format!("{side} side is empty")))?;
        let entry = level
            .front_mut()
            .ok_or_else(|| ChainmatchError::Internal("empty price level in book".into()))?;
        if qty <= Decimal::ZERO || qty >= entry.remaining_qty {
            return Err(ChainmatchError::validation(format!(
                "partial reduction {qty} invalid for remaining {}",
                entry.remaining_qty
            )));
        }
        entry.remaining_qty -= qty;
        Ok(&*entry)
    }

    // =================================================================
    // Removal by id
    // =================================================================

    /// Remove an entry anywhere in the book.
    pub fn remove(&mut self, order_id: &OrderId) -> Result<BookEntry> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(ChainmatchError::OrderNotFound(*order_id))?;

        let entry = match side {
            OrderSide::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
                let entry = level
                    .remove(order_id)
                    .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                entry
            }
            OrderSide::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
                let entry = level
                    .remove(order_id)
                    .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                entry
            }
        };
        Ok(entry)
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// best_ask - best_bid. `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Aggregated depth for the best `max_levels` prices on `side`.
    #[must_use]
    pub fn depth(&self, side: OrderSide, max_levels: usize) -> Vec<DepthLevel> {
        self.levels(side)
            .take(max_levels)
            .map(|level| DepthLevel {
                price: level.price,
                quantity: level.total_quantity(),
                orders: level.len(),
            })
            .collect()
    }

    /// Every entry on `side` in priority order (best price, then oldest).
    pub fn iter_side(&self, side: OrderSide) -> impl Iterator<Item = &BookEntry> {
        self.levels(side).flat_map(PriceLevel::iter)
    }

    /// Which side an order rests on, if it is in this book.
    #[must_use]
    pub fn side_of(&self, order_id: &OrderId) -> Option<OrderSide> {
        self.index.get(order_id).map(|(side, _)| *side)
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn levels(&self, side: OrderSide) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match side {
            OrderSide::Buy => Box::new(self.bids.values()),
            OrderSide::Sell => Box::new(self.asks.values()),
        }
    }

    // =================================================================
    // Snapshots
    // =================================================================

    #[must_use]
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            asset_id: self.asset_id.clone(),
            bids: self.iter_side(OrderSide::Buy).cloned().collect(),
            asks: self.iter_side(OrderSide::Sell).cloned().collect(),
        }
    }

    /// Rebuild a book; re-inserting in priority order reproduces it exactly.
    pub fn from_snapshot(snapshot: BookSnapshot) -> Result<Self> {
        let mut book = Self::new(snapshot.asset_id);
        for entry in snapshot.bids {
            book.insert(OrderSide::Buy, entry)?;
        }
        for entry in snapshot.asks {
            book.insert(OrderSide::Sell, entry)?;
        }
        Ok(book)
    }
}
