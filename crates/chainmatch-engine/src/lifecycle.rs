//! Order lifecycle: who may close an order, and when.
//!
//! ```text
//! Open ──fill──▶ PartiallyFilled ──fill──▶ Filled
//!   │                 │
//!   ├──cancel/expire──┴──▶ Cancelled | Expired
//! ```
//!
//! Terminal states never change again; the [`OrderStore`] refuses any
//! transition out of them.

use chainmatch_ledger::AccountLedger;
use chainmatch_matchcore::{OrderBook, OrderStore};
use chainmatch_types::{
    AccountId, AssetId, ChainmatchError, LogicalTime, OrderClosed, OrderId, OrderSide,
    OrderStatus, Result,
};
use rust_decimal::Decimal;

/// Asset and amount held in escrow for `qty` resting at `price` on `side`.
///
/// Buys lock quote (`price × qty`), sells lock base (`qty`).
pub fn escrow_requirement(
    side: OrderSide,
    price: Decimal,
    qty: Decimal,
    base: &AssetId,
    quote: &AssetId,
) -> Result<(AssetId, Decimal)> {
    match side {
        OrderSide::Buy => {
            let notional = price
                .checked_mul(qty)
                .ok_or_else(|| ChainmatchError::validation("notional overflow"))?;
            Ok((quote.clone(), notional))
        }
        OrderSide::Sell => Ok((base.clone(), qty)),
    }
}

/// Applies cancellations against one asset's book.
pub struct LifecycleManager<'a> {
    ledger: &'a mut AccountLedger,
    book: &'a mut OrderBook,
    orders: &'a mut OrderStore,
    quote: &'a AssetId,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(
        ledger: &'a mut AccountLedger,
        book: &'a mut OrderBook,
        orders: &'a mut OrderStore,
        quote: &'a AssetId,
    ) -> Self {
        Self {
            ledger,
            book,
            orders,
            quote,
        }
    }

    /// Cancel a resting order on behalf of `requester`.
    ///
    /// # Errors
    /// - `OrderNotFound` if the id is unknown
    /// - `Unauthorized` if `requester` does not own the order
    /// - `AlreadyClosed` if the order is Filled, Cancelled or Expired
    /// - `Expired` if `now >= expires_at`
    ///
    /// On success the order leaves the book, its remaining escrow returns
    /// to the owner and its status becomes Cancelled.
    pub fn cancel(
        &mut self,
        order_id: &OrderId,
        requester: AccountId,
        now: LogicalTime,
    ) -> Result<OrderClosed> {
        let order = self
            .orders
            .get(order_id)
            .ok_or(ChainmatchError::OrderNotFound(*order_id))?;

        if order.owner != requester {
            return Err(ChainmatchError::unauthorized(format!(
                "account {requester} does not own order {order_id}"
            )));
        }
        if order.status.is_terminal() {
            return Err(ChainmatchError::AlreadyClosed {
                order_id: *order_id,
                status: order.status,
            });
        }
        if now >= order.expires_at {
            return Err(ChainmatchError::Expired {
                order_id: *order_id,
                expires_at: order.expires_at,
                now,
            });
        }
        if !self.book.contains(order_id) {
            return Err(ChainmatchError::Internal(format!(
                "live order {order_id} missing from the {} book",
                self.book.asset_id
            )));
        }

        let (released_asset, released_amount) = escrow_requirement(
            order.side,
            order.price,
            order.remaining_qty,
            &order.asset_id,
            self.quote,
        )?;
        let owner = order.owner;

        self.ledger.release(owner, &released_asset, released_amount)?;
        self.book.remove(order_id)?;
        let order = self.orders.close(order_id, OrderStatus::Cancelled)?;

        tracing::debug!(
            order_id = %order_id,
            owner = %owner.short(),
            released = %released_amount,
            asset = %released_asset,
            "Order cancelled"
        );

        Ok(OrderClosed {
            order_id: *order_id,
            asset_id: order.asset_id.clone(),
            owner,
            side: order.side,
            price: order.price,
            remaining_qty: order.remaining_qty,
            released_asset,
            released_amount,
            timestamp: now,
        })
    }
}
