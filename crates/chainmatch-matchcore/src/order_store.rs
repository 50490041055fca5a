//! Order records keyed by id.
//!
//! Every accepted order stays here for audit, terminal ones included. The
//! store is the single place order status changes, and it refuses any
//! change that would regress the lifecycle.

use std::collections::BTreeMap;

use chainmatch_types::{AccountId, ChainmatchError, Order, OrderId, OrderStatus, Result, TradeId};
use rust_decimal::Decimal;

#[derive(Debug, Default)]
pub struct OrderStore {
    orders: BTreeMap<OrderId, Order>,
    /// Live (non-terminal) orders per owner.
    open_counts: BTreeMap<AccountId, usize>,
}

impl OrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records.
    pub fn from_orders(orders: impl IntoIterator<Item = Order>) -> Result<Self> {
        let mut store = Self::new();
        for order in orders {
            store.insert(order)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, order: Order) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(ChainmatchError::DuplicateOrder(order.id));
        }
        if !order.status.is_terminal() {
            *self.open_counts.entry(order.owner).or_default() += 1;
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Record a fill of `qty` against a stored order.
    ///
    /// Returns the order's new status (PartiallyFilled or Filled).
    pub fn apply_fill(
        &mut self,
        order_id: &OrderId,
        qty: Decimal,
        trade_id: TradeId,
    ) -> Result<OrderStatus> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
        if qty <= Decimal::ZERO || qty > order.remaining_qty {
            return Err(ChainmatchError::validation(format!(
                "fill {qty} exceeds remaining {} of order {order_id}",
                order.remaining_qty
            )));
        }
        let remaining = order.remaining_qty - qty;
        let status = if remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        Self::check_transition(order, status)?;

        order.remaining_qty = remaining;
        order.status = status;
        order.trade_ids.push(trade_id);
        let owner = order.owner;
        if status.is_terminal() {
            self.decrement_open(owner);
        }
        Ok(status)
    }

    /// Move a live order to Cancelled or Expired.
    pub fn close(&mut self, order_id: &OrderId, status: OrderStatus) -> Result<&Order> {
        if !matches!(status, OrderStatus::Cancelled | OrderStatus::Expired) {
            return Err(ChainmatchError::IllegalTransition {
                from: self
                    .orders
                    .get(order_id)
                    .map_or(OrderStatus::Open, |o| o.status),
                to: status,
            });
        }
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
        Self::check_transition(order, status)?;
        order.status = status;
        let owner = order.owner;
        self.decrement_open(owner);
        self.orders
            .get(order_id)
            .ok_or(ChainmatchError::OrderNotFound(*order_id))
    }

    /// Drop a record entirely.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let order = self.orders.remove(order_id)?;
        if !order.status.is_terminal() {
            self.decrement_open(order.owner);
        }
        Some(order)
    }

    /// Live orders owned by `account`.
    #[must_use]
    pub fn open_count(&self, account: &AccountId) -> usize {
        self.open_counts.get(account).copied().unwrap_or(0)
    }

    /// All records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Records owned by `account`, in id order.
    pub fn orders_of(&self, account: AccountId) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(move |o| o.owner == account)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn check_transition(order: &Order, next: OrderStatus) -> Result<()> {
        if order.status.is_terminal() {
            return Err(ChainmatchError::AlreadyClosed {
                order_id: order.id,
                status: order.status,
            });
        }
        if !order.status.can_transition_to(next) {
            return Err(ChainmatchError::IllegalTransition {
                from: order.status,
                to: next,
            });
        }
        Ok(())
    }

    fn decrement_open(&mut self, owner: AccountId) {
        if let Some(count) = self.open_counts.get_mut(&owner) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.open_counts.remove(&owner);
            }
        }
    }
}
