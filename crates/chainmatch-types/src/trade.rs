//! Trade records produced by the matching engine.
//!
//! A [`Trade`] is the immutable record of one fill between the incoming
//! (taker) order and a resting (maker) order, executed at the maker's price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, LogicalTime, OrderId, OrderSide, TradeId};

/// A single fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Derived from (transaction sequence, fill index).
    pub id: TradeId,
    /// Base asset traded.
    pub asset_id: AssetId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer: AccountId,
    pub seller: AccountId,
    /// Executed quantity in base units.
    pub quantity: Decimal,
    /// Execution price: the resting order's limit price.
    pub price: Decimal,
    /// price × quantity, in quote units.
    pub quote_amount: Decimal,
    /// Which side the incoming order was on.
    pub taker_side: OrderSide,
    /// Fee charged to the taker and credited to the protocol-fee account.
    pub taker_fee: Decimal,
    /// Asset the fee was taken in (what the taker received).
    pub fee_asset: AssetId,
    pub timestamp: LogicalTime,
}

impl Trade {
    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side == OrderSide::Buy
    }

    #[must_use]
    pub fn taker_order_id(&self) -> OrderId {
        match self.taker_side {
            OrderSide::Buy => self.buy_order_id,
            OrderSide::Sell => self.sell_order_id,
        }
    }

    #[must_use]
    pub fn maker_order_id(&self) -> OrderId {
        match self.taker_side {
            OrderSide::Buy => self.sell_order_id,
            OrderSide::Sell => self.buy_order_id,
        }
    }

    /// Whether `order_id` is either side of this trade.
    #[must_use]
    pub fn involves(&self, order_id: &OrderId) -> bool {
        self.buy_order_id == *order_id || self.sell_order_id == *order_id
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} taker={} {} @ {} = {}",
            self.id, self.asset_id, self.taker_side, self.quantity, self.price, self.quote_amount,
        )
    }
}
