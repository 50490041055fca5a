//! Events published to external observers.
//!
//! Events are derived from committed state changes only; a rejected
//! transaction never produces one.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, LogicalTime, OrderId, OrderSide, Trade};

/// An order leaving the book without being filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClosed {
    pub order_id: OrderId,
    pub asset_id: AssetId,
    pub owner: AccountId,
    pub side: OrderSide,
    pub price: Decimal,
    /// Unfilled quantity at the moment the order left the book.
    pub remaining_qty: Decimal,
    /// Escrow handed back to the owner.
    pub released_asset: AssetId,
    pub released_amount: Decimal,
    pub timestamp: LogicalTime,
}

/// Append-only event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    TradeExecuted(Trade),
    OrderCancelled(OrderClosed),
    /// Discovered lazily while matching against the book.
    OrderExpired(OrderClosed),
}

impl EngineEvent {
    /// Logical time at which the event happened.
    #[must_use]
    pub fn timestamp(&self) -> LogicalTime {
        match self {
            Self::TradeExecuted(trade) => trade.timestamp,
            Self::OrderCancelled(closed) | Self::OrderExpired(closed) => closed.timestamp,
        }
    }

    /// Short name, used as a log field and sink topic.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TradeExecuted(_) => "TradeExecuted",
            Self::OrderCancelled(_) => "OrderCancelled",
            Self::OrderExpired(_) => "OrderExpired",
        }
    }
}
