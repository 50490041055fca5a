//! The exchange: one deterministic state machine over the agreed log.
//!
//! [`Exchange::apply`] is the only entry point that changes state. It
//! checks transaction ordering, dispatches the closed [`Operation`] set,
//! and on success commits events and advances the cursor. A rejected
//! transaction changes nothing, the cursor included.

use std::collections::BTreeMap;

use chainmatch_ledger::{AccountLedger, FeeSchedule, SupplyConservation};
use chainmatch_matchcore::{
    BookSnapshot, DepthLevel, OrderBook, OrderStore, StateHasher, compute_trade_root,
};
use chainmatch_types::{
    Account, AccountId, Asset, AssetId, BalanceEntry, ChainmatchError, EngineConfig, EngineEvent,
    LogicalTime, Operation, Order, OrderId, OrderSide, OrderStatus, PlaceOrder, Result, Role,
    Trade, Transaction, TxContext, constants,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleManager;
use crate::matching::MatchingEngine;
use crate::recorder::{EventRecorder, EventSink};
use crate::store::{self, StateStore};

/// What one applied transaction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub sequence: u64,
    pub operation: &'static str,
    /// Events committed by this transaction, in order.
    pub events: Vec<EngineEvent>,
    /// Final record of the placed or cancelled order, if any.
    pub order: Option<Order>,
}

/// Position of the last applied transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    last_sequence: Option<u64>,
    last_time: LogicalTime,
}

#[derive(Debug)]
pub struct Exchange {
    config: EngineConfig,
    fees: FeeSchedule,
    ledger: AccountLedger,
    assets: BTreeMap<AssetId, Asset>,
    books: BTreeMap<AssetId, OrderBook>,
    orders: OrderStore,
    trades: Vec<Trade>,
    recorder: EventRecorder,
    cursor: Cursor,
}

impl Exchange {
    /// Genesis state: the quote asset and the protocol-fee account exist.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut ledger = AccountLedger::new();
        ledger.register(config.fee_account, Role::Trader)?;

        let quote = config.quote_asset.clone();
        let mut assets = BTreeMap::new();
        assets.insert(
            quote.clone(),
            Asset::new(quote.clone(), quote.as_str(), Decimal::ZERO),
        );

        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            quote = %quote,
            taker_fee_bps = config.taker_fee_bps,
            config = %config.fingerprint(),
            "Exchange initialised"
        );

        Ok(Self {
            fees: FeeSchedule::from_config(&config),
            config,
            ledger,
            assets,
            books: BTreeMap::new(),
            orders: OrderStore::new(),
            trades: Vec::new(),
            recorder: EventRecorder::new(),
            cursor: Cursor::default(),
        })
    }

    pub fn with_sink(config: EngineConfig, sink: Box<dyn EventSink>) -> Result<Self> {
        let mut exchange = Self::new(config)?;
        exchange.recorder.set_sink(sink);
        Ok(exchange)
    }

    pub fn set_sink(&mut self, sink: Box<dyn EventSink>) {
        self.recorder.set_sink(sink);
    }

    // =================================================================
    // Transaction entry point
    // =================================================================

    /// Apply one transaction from the ordered log.
    ///
    /// # Errors
    /// - `StaleTransaction` / `TimeRegression` if the context is out of order
    /// - any error of the dispatched operation
    /// - `SupplyInvariantViolation` if conservation checking is enabled and
    ///   fails (the state is then unsound and the executor must halt)
    pub fn apply(&mut self, tx: &Transaction) -> Result<TxReceipt> {
        let ctx = tx.context;
        let result = self
            .check_ordering(&ctx)
            .and_then(|()| self.dispatch(&ctx, &tx.operation));

        let (events, order) = match result {
            Ok(effects) => effects,
            Err(err) => {
                tracing::warn!(
                    sequence = ctx.sequence,
                    op = tx.operation.name(),
                    caller = %ctx.caller.short(),
                    error = %err,
                    "Transaction rejected"
                );
                return Err(err);
            }
        };

        self.cursor = Cursor {
            last_sequence: Some(ctx.sequence),
            last_time: ctx.now,
        };
        for event in &events {
            if let EngineEvent::TradeExecuted(trade) = event {
                self.trades.push(trade.clone());
            }
            self.recorder.record(event.clone());
        }

        if self.config.verify_conservation {
            if let Err(err) = self.ledger.check_invariants() {
                tracing::error!(
                    sequence = ctx.sequence,
                    op = tx.operation.name(),
                    error = %err,
                    "Supply conservation violated"
                );
                return Err(err);
            }
        }

        tracing::info!(
            sequence = ctx.sequence,
            op = tx.operation.name(),
            caller = %ctx.caller.short(),
            now = %ctx.now,
            events = events.len(),
            "Transaction applied"
        );

        Ok(TxReceipt {
            sequence: ctx.sequence,
            operation: tx.operation.name(),
            events,
            order,
        })
    }

    /// Build and apply a transaction in one call.
    pub fn submit(
        &mut self,
        sequence: u64,
        caller: AccountId,
        now: LogicalTime,
        operation: Operation,
    ) -> Result<TxReceipt> {
        self.apply(&Transaction {
            context: TxContext::new(sequence, caller, now),
            operation,
        })
    }

    fn check_ordering(&self, ctx: &TxContext) -> Result<()> {
        if let Some(last) = self.cursor.last_sequence {
            if ctx.sequence <= last {
                return Err(ChainmatchError::StaleTransaction {
                    sequence: ctx.sequence,
                    last,
                });
            }
        }
        if ctx.now < self.cursor.last_time {
            return Err(ChainmatchError::TimeRegression {
                now: ctx.now,
                last: self.cursor.last_time,
            });
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        ctx: &TxContext,
        operation: &Operation,
    ) -> Result<(Vec<EngineEvent>, Option<Order>)> {
        match operation {
            Operation::RegisterAccount { account, role } => {
                self.register_account(ctx, *account, *role)?;
                Ok((Vec::new(), None))
            }
            Operation::CreateAsset {
                asset_id,
                name,
                total_supply,
            } => {
                self.create_asset(ctx, asset_id, name, *total_supply)?;
                Ok((Vec::new(), None))
            }
            Operation::Deposit { asset_id, amount } => {
                self.require_transferable(ctx, asset_id, *amount)?;
                self.ledger.deposit(ctx.caller, asset_id, *amount)?;
                Ok((Vec::new(), None))
            }
            Operation::Withdraw { asset_id, amount } => {
                self.require_transferable(ctx, asset_id, *amount)?;
                self.ledger.withdraw(ctx.caller, asset_id, *amount)?;
                Ok((Vec::new(), None))
            }
            Operation::PlaceOrder(place) => self.place_order(ctx, place),
            Operation::CancelOrder { order_id } => self.cancel_order(ctx, order_id),
        }
    }

    // =================================================================
    // Operations
    // =================================================================

    fn register_account(&mut self, ctx: &TxContext, account: AccountId, role: Role) -> Result<()> {
        if self.ledger.contains(&account) {
            return Err(ChainmatchError::DuplicateAccount(account));
        }
        let caller_is_admin = self
            .ledger
            .account(&ctx.caller)
            .is_some_and(Account::is_admin);
        match role {
            Role::Admin => {
                let bootstrap = !self.ledger.accounts().any(Account::is_admin);
                if !bootstrap && !caller_is_admin {
                    return Err(ChainmatchError::unauthorized(
                        "only an admin may register another admin",
                    ));
                }
            }
            Role::Trader => {
                if account != ctx.caller && !caller_is_admin {
                    return Err(ChainmatchError::unauthorized(
                        "traders may only register themselves",
                    ));
                }
            }
        }
        self.ledger.register(account, role)
    }

    fn create_asset(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        name: &str,
        total_supply: Decimal,
    ) -> Result<()> {
        let caller = self
            .ledger
            .account(&ctx.caller)
            .ok_or(ChainmatchError::AccountNotFound(ctx.caller))?;
        if !caller.is_admin() {
            return Err(ChainmatchError::unauthorized("only an admin may create assets"));
        }
        if asset_id.as_str().trim().is_empty() {
            return Err(ChainmatchError::validation("asset id must not be empty"));
        }
        if total_supply.is_sign_negative() {
            return Err(ChainmatchError::validation("total supply must not be negative"));
        }
        if self.assets.contains_key(asset_id) {
            return Err(ChainmatchError::DuplicateAsset(asset_id.clone()));
        }
        self.assets.insert(
            asset_id.clone(),
            Asset::new(asset_id.clone(), name, total_supply),
        );
        self.books
            .insert(asset_id.clone(), OrderBook::new(asset_id.clone()));
        tracing::debug!(asset = %asset_id, %name, "Asset created");
        Ok(())
    }

    fn require_transferable(&self, ctx: &TxContext, asset_id: &AssetId, amount: Decimal) -> Result<()> {
        if !self.ledger.contains(&ctx.caller) {
            return Err(ChainmatchError::AccountNotFound(ctx.caller));
        }
        if !self.assets.contains_key(asset_id) {
            return Err(ChainmatchError::AssetNotFound(asset_id.clone()));
        }
        if amount.normalize().scale() > constants::QTY_PRECISION {
            return Err(ChainmatchError::validation(format!(
                "amount {amount} has more than {} decimal places",
                constants::QTY_PRECISION
            )));
        }
        Ok(())
    }

    fn place_order(
        &mut self,
        ctx: &TxContext,
        place: &PlaceOrder,
    ) -> Result<(Vec<EngineEvent>, Option<Order>)> {
        if !self.ledger.contains(&ctx.caller) {
            return Err(ChainmatchError::AccountNotFound(ctx.caller));
        }
        if place.asset_id == self.config.quote_asset {
            return Err(ChainmatchError::validation(
                "the quote asset cannot be traded against itself",
            ));
        }
        let limit = self.config.max_open_orders_per_account;
        if self.orders.open_count(&ctx.caller) >= limit {
            return Err(ChainmatchError::OrderLimitExceeded {
                account: ctx.caller,
                limit,
            });
        }
        let book = self
            .books
            .get_mut(&place.asset_id)
            .ok_or_else(|| ChainmatchError::AssetNotFound(place.asset_id.clone()))?;

        let order = Order {
            id: place.order_id,
            asset_id: place.asset_id.clone(),
            owner: ctx.caller,
            side: place.side,
            price: place.price,
            original_qty: place.quantity,
            remaining_qty: place.quantity,
            status: OrderStatus::Open,
            created_at: ctx.now,
            expires_at: place.expires_at,
            sequence: ctx.sequence,
            trade_ids: Vec::new(),
        };

        let outcome = MatchingEngine::new(
            &mut self.ledger,
            book,
            &mut self.orders,
            &self.fees,
            &self.config.quote_asset,
        )
        .execute(order, ctx.sequence, ctx.now)?;

        let events = outcome
            .expired
            .into_iter()
            .map(EngineEvent::OrderExpired)
            .chain(outcome.trades.into_iter().map(EngineEvent::TradeExecuted))
            .collect();
        Ok((events, Some(outcome.order)))
    }

    fn cancel_order(
        &mut self,
        ctx: &TxContext,
        order_id: &OrderId,
    ) -> Result<(Vec<EngineEvent>, Option<Order>)> {
        let asset_id = self
            .orders
            .get(order_id)
            .map(|o| o.asset_id.clone())
            .ok_or(ChainmatchError::OrderNotFound(*order_id))?;
        let book = self
            .books
            .get_mut(&asset_id)
            .ok_or(ChainmatchError::AssetNotFound(asset_id))?;

        let closed = LifecycleManager::new(
            &mut self.ledger,
            book,
            &mut self.orders,
            &self.config.quote_asset,
        )
        .cancel(order_id, ctx.caller, ctx.now)?;

        let order = self.orders.get(order_id).cloned();
        Ok((vec![EngineEvent::OrderCancelled(closed)], order))
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn balance(&self, account: AccountId, asset: &AssetId) -> BalanceEntry {
        self.ledger.balance(account, asset)
    }

    #[must_use]
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.ledger.account(id)
    }

    #[must_use]
    pub fn asset(&self, id: &AssetId) -> Option<&Asset> {
        self.assets.get(id)
    }

    #[must_use]
    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    #[must_use]
    pub fn book(&self, asset: &AssetId) -> Option<&OrderBook> {
        self.books.get(asset)
    }

    #[must_use]
    pub fn best_bid(&self, asset: &AssetId) -> Option<Decimal> {
        self.book(asset).and_then(OrderBook::best_bid)
    }

    #[must_use]
    pub fn best_ask(&self, asset: &AssetId) -> Option<Decimal> {
        self.book(asset).and_then(OrderBook::best_ask)
    }

    #[must_use]
    pub fn spread(&self, asset: &AssetId) -> Option<Decimal> {
        self.book(asset).and_then(OrderBook::spread)
    }

    #[must_use]
    pub fn depth(&self, asset: &AssetId, side: OrderSide, levels: usize) -> Vec<DepthLevel> {
        self.book(asset)
            .map(|b| b.depth(side, levels))
            .unwrap_or_default()
    }

    /// The full trade log, in execution order.
    #[must_use]
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Trades in which `order_id` took part, in execution order.
    pub fn trades_for_order(&self, order_id: &OrderId) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(move |t| t.involves(order_id))
    }

    #[must_use]
    pub fn events(&self) -> &[EngineEvent] {
        self.recorder.events()
    }

    #[must_use]
    pub fn sink_failures(&self) -> u64 {
        self.recorder.sink_failures()
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.cursor.last_sequence
    }

    #[must_use]
    pub fn last_time(&self) -> LogicalTime {
        self.cursor.last_time
    }

    #[must_use]
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Sum of all balances of `asset`, fee account included.
    #[must_use]
    pub fn total_supply(&self, asset: &AssetId) -> Decimal {
        self.ledger.total_supply(asset)
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.ledger.check_invariants()
    }

    // =================================================================
    // Determinism
    // =================================================================

    #[must_use]
    pub fn trade_root(&self) -> [u8; 32] {
        compute_trade_root(&self.trades)
    }

    /// SHA-256 over books, balances, order records and the trade log.
    #[must_use]
    pub fn state_digest(&self) -> [u8; 32] {
        let mut hasher = StateHasher::new();
        for book in self.books.values() {
            hasher.book(book);
        }
        for account in self.ledger.accounts() {
            hasher.account(account);
        }
        for order in self.orders.iter() {
            hasher.order(order);
        }
        hasher.trade_root(&self.trade_root());
        hasher.finish()
    }

    #[must_use]
    pub fn state_digest_hex(&self) -> String {
        hex::encode(self.state_digest())
    }

    // =================================================================
    // Persistence
    // =================================================================

    /// Write a full snapshot, replacing any previous one in `store`.
    pub fn persist(&self, store: &mut dyn StateStore) -> Result<()> {
        for prefix in store::SNAPSHOT_PREFIXES {
            for (key, _) in store.scan_prefix(prefix)? {
                store.delete(&key)?;
            }
        }

        store::put_json(store, store::META_CONFIG, &self.config.fingerprint())?;
        store::put_json(store, store::META_CURSOR, &self.cursor)?;
        store::put_json(store, store::META_SUPPLY, self.ledger.supply())?;
        for account in self.ledger.accounts() {
            store::put_json(store, &format!("{}{}", store::ACCOUNT_PREFIX, account.id), account)?;
        }
        for asset in self.assets.values() {
            store::put_json(store, &format!("{}{}", store::ASSET_PREFIX, asset.id), asset)?;
        }
        for order in self.orders.iter() {
            store::put_json(store, &format!("{}{}", store::ORDER_PREFIX, order.id), order)?;
        }
        for book in self.books.values() {
            store::put_json(
                store,
                &format!("{}{}", store::BOOK_PREFIX, book.asset_id),
                &book.snapshot(),
            )?;
        }
        for (i, trade) in self.trades.iter().enumerate() {
            store::put_json(store, &store::log_key(store::TRADE_PREFIX, i), trade)?;
        }
        for (i, event) in self.recorder.events().iter().enumerate() {
            store::put_json(store, &store::log_key(store::EVENT_PREFIX, i), event)?;
        }

        tracing::info!(
            sequence = ?self.cursor.last_sequence,
            accounts = self.ledger.account_count(),
            orders = self.orders.len(),
            trades = self.trades.len(),
            "Snapshot persisted"
        );
        Ok(())
    }

    /// Rebuild an exchange from a snapshot written by [`Self::persist`].
    ///
    /// # Errors
    /// `Configuration` if the snapshot was taken under a different config;
    /// `Store` if a record is missing or corrupt.
    pub fn restore(config: EngineConfig, store: &dyn StateStore) -> Result<Self> {
        config.validate()?;
        let fingerprint: String = store::get_json(store, store::META_CONFIG)?
            .ok_or_else(|| ChainmatchError::Store("snapshot has no config fingerprint".into()))?;
        if fingerprint != config.fingerprint() {
            return Err(ChainmatchError::Configuration(
                "snapshot was taken under a different configuration".into(),
            ));
        }
        let cursor: Cursor = store::get_json(store, store::META_CURSOR)?
            .ok_or_else(|| ChainmatchError::Store("snapshot has no cursor".into()))?;
        let supply: SupplyConservation = store::get_json(store, store::META_SUPPLY)?
            .ok_or_else(|| ChainmatchError::Store("snapshot has no supply record".into()))?;

        let accounts: Vec<Account> = store::scan_json(store, store::ACCOUNT_PREFIX)?;
        let assets: Vec<Asset> = store::scan_json(store, store::ASSET_PREFIX)?;
        let orders: Vec<Order> = store::scan_json(store, store::ORDER_PREFIX)?;
        let books: Vec<BookSnapshot> = store::scan_json(store, store::BOOK_PREFIX)?;
        let trades: Vec<Trade> = store::scan_json(store, store::TRADE_PREFIX)?;
        let events: Vec<EngineEvent> = store::scan_json(store, store::EVENT_PREFIX)?;

        let mut restored_books = BTreeMap::new();
        for snapshot in books {
            let book = OrderBook::from_snapshot(snapshot)?;
            restored_books.insert(book.asset_id.clone(), book);
        }

        let exchange = Self {
            fees: FeeSchedule::from_config(&config),
            config,
            ledger: AccountLedger::from_parts(accounts, supply),
            assets: assets.into_iter().map(|a| (a.id.clone(), a)).collect(),
            books: restored_books,
            orders: OrderStore::from_orders(orders)?,
            trades,
            recorder: EventRecorder::from_events(events),
            cursor,
        };
        exchange.ledger.check_invariants()?;

        tracing::info!(
            sequence = ?exchange.cursor.last_sequence,
            digest = %exchange.state_digest_hex(),
            "Snapshot restored"
        );
        Ok(exchange)
    }
}
