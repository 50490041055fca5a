//! Order types.
//!
//! Orders are limit orders against a single base asset, priced in the
//! engine's quote asset. Status transitions are monotone: once an order
//! reaches a terminal status it never changes again.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, LogicalTime, OrderId, TradeId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side this order matches against.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Filled, Cancelled and Expired are final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Expired)
    }

    /// Whether `self -> next` is a legal (non-regressing) transition.
    ///
    /// `PartiallyFilled -> PartiallyFilled` is allowed: each further fill
    /// keeps the status while the remaining quantity shrinks.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Open => next != Self::Open,
            Self::PartiallyFilled => next != Self::Open,
            Self::Filled | Self::Cancelled | Self::Expired => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A limit order and its fill state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Base asset being bought or sold.
    pub asset_id: AssetId,
    pub owner: AccountId,
    pub side: OrderSide,
    /// Limit price in quote units per base unit.
    pub price: Decimal,
    pub original_qty: Decimal,
    pub remaining_qty: Decimal,
    pub status: OrderStatus,
    pub created_at: LogicalTime,
    pub expires_at: LogicalTime,
    /// Arrival sequence assigned by the engine; breaks ties at equal price.
    pub sequence: u64,
    /// Trades this order took part in, in execution order.
    pub trade_ids: Vec<TradeId>,
}

impl Order {
    /// An order is expired once `now` has moved past its expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: LogicalTime) -> bool {
        self.expires_at < now
    }

    /// Whether this order is willing to trade at `price`.
    #[must_use]
    pub fn accepts_price(&self, price: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => self.price >= price,
            OrderSide::Sell => self.price <= price,
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining_qty.is_zero()
    }

    #[must_use]
    pub fn filled_qty(&self) -> Decimal {
        self.original_qty - self.remaining_qty
    }

    /// Status implied by the fill state of a live order.
    #[must_use]
    pub fn fill_status(&self) -> OrderStatus {
        if self.remaining_qty.is_zero() {
            OrderStatus::Filled
        } else if self.remaining_qty == self.original_qty {
            OrderStatus::Open
        } else {
            OrderStatus::PartiallyFilled
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_for(AccountId::new(), side, price, qty)
    }

    pub fn dummy_for(owner: AccountId, side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self {
            id: OrderId::new(),
            asset_id: AssetId::new("GOLD"),
            owner,
            side,
            price,
            original_qty: qty,
            remaining_qty: qty,
            status: OrderStatus::Open,
            created_at: LogicalTime(0),
            expires_at: LogicalTime(u64::MAX),
            sequence: 0,
            trade_ids: Vec::new(),
        }
    }
}
