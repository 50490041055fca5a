//! Continuous price-time matching for one incoming limit order.
//!
//! # Execution
//!
//! 1. Validate the order (positive price and quantity, precision, expiry)
//! 2. **Plan**: walk the opposite side of the book best-first, without
//!    mutating anything, and decide which resting entries expire and which
//!    fill, and by how much
//! 3. **Settle**: inside one journaled ledger scope, escrow the incoming
//!    order, release the escrow of expired entries, settle each fill and
//!    release buy-side price improvement. Any failure rolls the ledger back
//!    and leaves the book and order records untouched
//! 4. **Apply**: update the book and order records to match the plan and
//!    rest any remainder
//!
//! Fills execute at the resting (maker) price. The plan is a pure function
//! of (book state, incoming order, logical time).

use chainmatch_ledger::{AccountLedger, FeeSchedule, SettleInstruction, SettlementReceipt};
use chainmatch_matchcore::{BookEntry, OrderBook, OrderStore};
use chainmatch_types::{
    AssetId, ChainmatchError, LogicalTime, Order, OrderClosed, OrderSide, OrderStatus, Result,
    Trade, TradeId, constants,
};
use rust_decimal::Decimal;

use crate::lifecycle::escrow_requirement;

/// One step of a match plan, in book priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Resting entry found past its expiry; removed and refunded.
    Expire(BookEntry),
    /// Fill `qty` against a resting entry at its price.
    Fill { maker: BookEntry, qty: Decimal },
}

/// Everything one PlaceOrder changed.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Final record of the incoming order.
    pub order: Order,
    /// Fills in execution order.
    pub trades: Vec<Trade>,
    /// Resting orders removed by lazy expiry.
    pub expired: Vec<OrderClosed>,
}

/// Reject malformed orders before any state is touched.
pub fn validate_order(order: &Order, now: LogicalTime) -> Result<()> {
    if order.original_qty <= Decimal::ZERO {
        return Err(ChainmatchError::validation(format!(
            "quantity must be positive, got {}",
            order.original_qty
        )));
    }
    if order.price <= Decimal::ZERO {
        return Err(ChainmatchError::validation(format!(
            "price must be positive, got {}",
            order.price
        )));
    }
    if order.price.normalize().scale() > constants::PRICE_PRECISION {
        return Err(ChainmatchError::validation(format!(
            "price {} has more than {} decimal places",
            order.price,
            constants::PRICE_PRECISION
        )));
    }
    if order.original_qty.normalize().scale() > constants::QTY_PRECISION {
        return Err(ChainmatchError::validation(format!(
            "quantity {} has more than {} decimal places",
            order.original_qty,
            constants::QTY_PRECISION
        )));
    }
    if order.expires_at < now {
        return Err(ChainmatchError::Expired {
            order_id: order.id,
            expires_at: order.expires_at,
            now,
        });
    }
    Ok(())
}

/// Decide which resting entries the incoming order expires and fills.
///
/// Stops at the first entry whose price does not cross, once the
/// incoming order is filled, or when the opposite side runs out.
#[must_use]
pub fn plan(book: &OrderBook, incoming: &Order, now: LogicalTime) -> Vec<PlanStep> {
    let mut steps = Vec::new();
    let mut remaining = incoming.remaining_qty;

    for entry in book.iter_side(incoming.side.opposite()) {
        if remaining.is_zero() || !incoming.accepts_price(entry.price) {
            break;
        }
        if entry.is_expired_at(now) {
            steps.push(PlanStep::Expire(entry.clone()));
            continue;
        }
        let qty = remaining.min(entry.remaining_qty);
        remaining -= qty;
        steps.push(PlanStep::Fill {
            maker: entry.clone(),
            qty,
        });
    }
    steps
}

/// Runs one incoming order against one asset's book.
pub struct MatchingEngine<'a> {
    ledger: &'a mut AccountLedger,
    book: &'a mut OrderBook,
    orders: &'a mut OrderStore,
    fees: &'a FeeSchedule,
    quote: &'a AssetId,
}

impl<'a> MatchingEngine<'a> {
    pub fn new(
        ledger: &'a mut AccountLedger,
        book: &'a mut OrderBook,
        orders: &'a mut OrderStore,
        fees: &'a FeeSchedule,
        quote: &'a AssetId,
    ) -> Self {
        Self {
            ledger,
            book,
            orders,
            fees,
            quote,
        }
    }

    /// Match `incoming` and rest any remainder.
    ///
    /// `tx_sequence` seeds the deterministic trade ids. Any error up to and
    /// including settlement leaves the ledger, the book and the order
    /// records unchanged. Once the ledger scope has committed, a failure to
    /// mirror the plan onto the book is reported as `Internal`: the book no
    /// longer agrees with the ledger and the engine state is unsound.
    pub fn execute(
        &mut self,
        mut incoming: Order,
        tx_sequence: u64,
        now: LogicalTime,
    ) -> Result<MatchOutcome> {
        validate_order(&incoming, now)?;
        if incoming.asset_id != self.book.asset_id {
            return Err(ChainmatchError::Internal(format!(
                "order for {} routed to the {} book",
                incoming.asset_id, self.book.asset_id
            )));
        }
        if self.orders.contains(&incoming.id) {
            return Err(ChainmatchError::DuplicateOrder(incoming.id));
        }

        let base = self.book.asset_id.clone();
        let steps = plan(self.book, &incoming, now);
        let receipts = self.settle_plan(&incoming, &steps, &base)?;
        let order_id = incoming.id;
        self.apply_plan(&mut incoming, steps, receipts, &base, tx_sequence, now)
            .map_err(|err| {
                tracing::error!(
                    %order_id,
                    error = %err,
                    "Book update failed after settlement committed; engine state is unsound"
                );
                ChainmatchError::Internal(format!(
                    "order {order_id} settled but book update failed: {err}"
                ))
            })
    }

    /// All ledger effects of the plan, in one rollback scope.
    fn settle_plan(
        &mut self,
        incoming: &Order,
        steps: &[PlanStep],
        base: &AssetId,
    ) -> Result<Vec<SettlementReceipt>> {
        let quote = self.quote;
        let fees = self.fees;
        let maker_side = incoming.side.opposite();

        self.ledger.atomically(|ledger| {
            let (escrow_asset, escrow_amount) = escrow_requirement(
                incoming.side,
                incoming.price,
                incoming.original_qty,
                base,
                quote,
            )?;
            ledger.escrow(incoming.owner, &escrow_asset, escrow_amount)?;

            let mut receipts = Vec::new();
            for step in steps {
                match step {
                    PlanStep::Expire(entry) => {
                        let (asset, amount) = escrow_requirement(
                            maker_side,
                            entry.price,
                            entry.remaining_qty,
                            base,
                            quote,
                        )?;
                        ledger.release(entry.owner, &asset, amount)?;
                    }
                    PlanStep::Fill { maker, qty } => {
                        let (buyer, seller) = match incoming.side {
                            OrderSide::Buy => (incoming.owner, maker.owner),
                            OrderSide::Sell => (maker.owner, incoming.owner),
                        };
                        let receipt = ledger.settle(
                            &SettleInstruction {
                                buyer,
                                seller,
                                base: base.clone(),
                                quote: quote.clone(),
                                quantity: *qty,
                                price: maker.price,
                                taker_side: incoming.side,
                            },
                            fees,
                        )?;
                        if incoming.side == OrderSide::Buy && maker.price < incoming.price {
                            let improvement = (incoming.price - maker.price)
                                .checked_mul(*qty)
                                .ok_or_else(|| ChainmatchError::validation("notional overflow"))?;
                            ledger.release(incoming.owner, quote, improvement)?;
                        }
                        receipts.push(receipt);
                    }
                }
            }
            Ok(receipts)
        })
    }

    /// Mirror a settled plan onto the book and the order records.
    fn apply_plan(
        &mut self,
        incoming: &mut Order,
        steps: Vec<PlanStep>,
        receipts: Vec<SettlementReceipt>,
        base: &AssetId,
        tx_sequence: u64,
        now: LogicalTime,
    ) -> Result<MatchOutcome> {
        let maker_side = incoming.side.opposite();
        let mut trades = Vec::with_capacity(receipts.len());
        let mut expired = Vec::new();
        let mut receipts = receipts.into_iter();
        let mut fill_index: u64 = 0;

        for step in steps {
            match step {
                PlanStep::Expire(entry) => {
                    let removed = self.book.remove_top(maker_side);
                    debug_assert_eq!(removed.map(|e| e.order_id), Some(entry.order_id));
                    self.orders.close(&entry.order_id, OrderStatus::Expired)?;
                    let (released_asset, released_amount) = escrow_requirement(
                        maker_side,
                        entry.price,
                        entry.remaining_qty,
                        base,
                        self.quote,
                    )?;
                    tracing::warn!(
                        order_id = %entry.order_id,
                        owner = %entry.owner.short(),
                        expires_at = %entry.expires_at,
                        %now,
                        "Resting order expired during matching"
                    );
                    expired.push(OrderClosed {
                        order_id: entry.order_id,
                        asset_id: base.clone(),
                        owner: entry.owner,
                        side: maker_side,
                        price: entry.price,
                        remaining_qty: entry.remaining_qty,
                        released_asset,
                        released_amount,
                        timestamp: now,
                    });
                }
                PlanStep::Fill { maker, qty } => {
                    let receipt = receipts.next().ok_or_else(|| {
                        ChainmatchError::Internal("settlement receipt missing for fill".into())
                    })?;
                    let trade_id = TradeId::deterministic(tx_sequence, fill_index);
                    fill_index += 1;

                    if qty == maker.remaining_qty {
                        let removed = self.book.remove_top(maker_side);
                        debug_assert_eq!(removed.map(|e| e.order_id), Some(maker.order_id));
                    } else {
                        self.book.reduce_top(maker_side, qty)?;
                    }
                    self.orders.apply_fill(&maker.order_id, qty, trade_id)?;
                    incoming.remaining_qty -= qty;
                    incoming.trade_ids.push(trade_id);

                    let (buy_order_id, sell_order_id, buyer, seller) = match incoming.side {
                        OrderSide::Buy => (incoming.id, maker.order_id, incoming.owner, maker.owner),
                        OrderSide::Sell => (maker.order_id, incoming.id, maker.owner, incoming.owner),
                    };
                    let trade = Trade {
                        id: trade_id,
                        asset_id: base.clone(),
                        buy_order_id,
                        sell_order_id,
                        buyer,
                        seller,
                        quantity: qty,
                        price: maker.price,
                        quote_amount: receipt.quote_amount,
                        taker_side: incoming.side,
                        taker_fee: receipt.fee,
                        fee_asset: receipt.fee_asset,
                        timestamp: now,
                    };
                    tracing::debug!(
                        trade_id = %trade.id,
                        asset = %trade.asset_id,
                        buyer = %trade.buyer.short(),
                        seller = %trade.seller.short(),
                        price = %trade.price,
                        qty = %trade.quantity,
                        fee = %trade.taker_fee,
                        "Trade executed"
                    );
                    trades.push(trade);
                }
            }
        }

        incoming.status = incoming.fill_status();
        if !incoming.remaining_qty.is_zero() {
            self.book
                .insert(incoming.side, BookEntry::from(&*incoming))?;
        }
        self.orders.insert(incoming.clone())?;

        Ok(MatchOutcome {
            order: incoming.clone(),
            trades,
            expired,
        })
    }
}
