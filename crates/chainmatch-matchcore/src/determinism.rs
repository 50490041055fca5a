//! Determinism verification for independent executors.
//!
//! Two executors replaying the same transaction log must end in the same
//! state. The trade root is a hash over the trade log; the state digest
//! folds in books, balances and order records as well, so comparing two
//! 32-byte values is enough to prove agreement.
//!
//! Decimals are hashed in normalized form, so `10` and `10.00` agree.

use chainmatch_types::{Account, Order, Trade};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::orderbook::OrderBook;
use crate::price_level::BookEntry;

fn hash_decimal(hasher: &mut Sha256, value: Decimal) {
    hasher.update(value.normalize().to_string().as_bytes());
    hasher.update([0u8]);
}

/// Hash over a trade log, order-sensitive.
#[must_use]
pub fn compute_trade_root(trades: &[Trade]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"chainmatch:trade_root:v1:");
    hasher.update((trades.len() as u64).to_le_bytes());

    for trade in trades {
        hasher.update(trade.id.0.as_bytes());
        hasher.update(trade.asset_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(trade.buy_order_id.0.as_bytes());
        hasher.update(trade.sell_order_id.0.as_bytes());
        hasher.update(trade.buyer.0.as_bytes());
        hasher.update(trade.seller.0.as_bytes());
        hash_decimal(&mut hasher, trade.price);
        hash_decimal(&mut hasher, trade.quantity);
        hash_decimal(&mut hasher, trade.quote_amount);
        hash_decimal(&mut hasher, trade.taker_fee);
        hasher.update(trade.fee_asset.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(trade.timestamp.0.to_le_bytes());
    }

    to_root(&hasher.finalize())
}

fn to_root(digest: &[u8]) -> [u8; 32] {
    let mut root = [0u8; 32];
    root.copy_from_slice(digest);
    root
}

/// Recompute the trade root and compare.
#[must_use]
pub fn verify_trade_root(trades: &[Trade], expected_root: &[u8; 32]) -> bool {
    compute_trade_root(trades) == *expected_root
}

/// Incremental digest over a whole engine state.
///
/// Callers must feed components in a deterministic order (the engine uses
/// `BTreeMap` iteration order everywhere).
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    #[must_use]
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"chainmatch:state:v1:");
        Self { hasher }
    }

    pub fn book(&mut self, book: &OrderBook) -> &mut Self {
        self.hasher.update(b"book:");
        self.hasher.update(book.asset_id.as_str().as_bytes());
        self.hasher.update([0u8]);
        for (tag, side) in [
            (b'B', chainmatch_types::OrderSide::Buy),
            (b'S', chainmatch_types::OrderSide::Sell),
        ] {
            self.hasher.update([tag]);
            for entry in book.iter_side(side) {
                self.entry(entry);
            }
        }
        self
    }

    fn entry(&mut self, entry: &BookEntry) {
        self.hasher.update(entry.order_id.0.as_bytes());
        hash_decimal(&mut self.hasher, entry.price);
        hash_decimal(&mut self.hasher, entry.remaining_qty);
        self.hasher.update(entry.sequence.to_le_bytes());
    }

    pub fn account(&mut self, account: &Account) -> &mut Self {
        self.hasher.update(b"account:");
        self.hasher.update(account.id.0.as_bytes());
        self.hasher.update(account.role.to_string().as_bytes());
        for (asset, balance) in &account.balances {
            if balance.is_zero() {
                continue;
            }
            self.hasher.update(asset.as_str().as_bytes());
            self.hasher.update([0u8]);
            hash_decimal(&mut self.hasher, balance.available);
            hash_decimal(&mut self.hasher, balance.escrowed);
        }
        self
    }

    pub fn order(&mut self, order: &Order) -> &mut Self {
        self.hasher.update(b"order:");
        self.hasher.update(order.id.0.as_bytes());
        self.hasher.update(order.owner.0.as_bytes());
        self.hasher.update(order.side.to_string().as_bytes());
        self.hasher.update(order.status.to_string().as_bytes());
        hash_decimal(&mut self.hasher, order.price);
        hash_decimal(&mut self.hasher, order.original_qty);
        hash_decimal(&mut self.hasher, order.remaining_qty);
        self.hasher.update(order.expires_at.0.to_le_bytes());
        self.hasher.update((order.trade_ids.len() as u64).to_le_bytes());
        for trade_id in &order.trade_ids {
            self.hasher.update(trade_id.0.as_bytes());
        }
        self
    }

    pub fn trade_root(&mut self, root: &[u8; 32]) -> &mut Self {
        self.hasher.update(b"trades:");
        self.hasher.update(root);
        self
    }

    #[must_use]
    pub fn finish(self) -> [u8; 32] {
        to_root(&self.hasher.finalize())
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}
