//! Integration test: snapshot persistence
//!
//! An executor that persists, restarts from the snapshot and keeps
//! applying the log must end in the same state as one that never stopped.

use chainmatch_engine::store::{self, StateStore};
use chainmatch_engine::{Exchange, MemoryStore};
use chainmatch_types::*;
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn admin() -> AccountId {
    AccountId::from_bytes([0xAA; 16])
}

fn alice() -> AccountId {
    AccountId::from_bytes([1; 16])
}

fn bob() -> AccountId {
    AccountId::from_bytes([2; 16])
}

fn gold() -> AssetId {
    AssetId::new("GOLD")
}

fn eth() -> AssetId {
    AssetId::new("ETH")
}

fn place(seq: u64, who: AccountId, now: u64, id: u8, side: OrderSide, price: i64, qty: i64) -> Transaction {
    Transaction {
        context: TxContext::new(seq, who, LogicalTime(now)),
        operation: Operation::PlaceOrder(PlaceOrder {
            order_id: OrderId::from_bytes([id; 16]),
            asset_id: gold(),
            side,
            price: dec(price),
            quantity: dec(qty),
            expires_at: LogicalTime(now + 20),
        }),
    }
}

fn op(seq: u64, who: AccountId, now: u64, operation: Operation) -> Transaction {
    Transaction {
        context: TxContext::new(seq, who, LogicalTime(now)),
        operation,
    }
}

fn log() -> Vec<Transaction> {
    vec![
        op(1, admin(), 0, Operation::RegisterAccount { account: admin(), role: Role::Admin }),
        op(
            2,
            admin(),
            0,
            Operation::CreateAsset {
                asset_id: gold(),
                name: "Gold".into(),
                total_supply: dec(10_000),
            },
        ),
        op(3, alice(), 0, Operation::RegisterAccount { account: alice(), role: Role::Trader }),
        op(4, bob(), 0, Operation::RegisterAccount { account: bob(), role: Role::Trader }),
        op(5, alice(), 0, Operation::Deposit { asset_id: eth(), amount: dec(1_000) }),
        op(6, bob(), 0, Operation::Deposit { asset_id: gold(), amount: dec(100) }),
        place(7, alice(), 1, 1, OrderSide::Buy, 10, 20),
        place(8, bob(), 2, 2, OrderSide::Sell, 9, 5),
        place(9, bob(), 3, 3, OrderSide::Sell, 12, 10),
        place(10, alice(), 4, 4, OrderSide::Buy, 11, 5),
        // -- snapshot point --
        place(11, alice(), 30, 5, OrderSide::Buy, 12, 4),
        op(12, alice(), 31, Operation::CancelOrder { order_id: OrderId::from_bytes([5; 16]) }),
        place(13, bob(), 32, 6, OrderSide::Sell, 8, 7),
        op(14, bob(), 33, Operation::Withdraw { asset_id: eth(), amount: dec(10) }),
    ]
}

const SNAPSHOT_AT: usize = 10;

#[test]
fn restore_then_continue_matches_uninterrupted_run() {
    let log = log();
    let config = EngineConfig::default();

    let mut straight = Exchange::new(config.clone()).unwrap();
    for tx in &log {
        straight.apply(tx).unwrap();
    }

    let mut first = Exchange::new(config.clone()).unwrap();
    for tx in &log[..SNAPSHOT_AT] {
        first.apply(tx).unwrap();
    }
    let mut store = MemoryStore::new();
    first.persist(&mut store).unwrap();

    let mut resumed = Exchange::restore(config, &store).unwrap();
    assert_eq!(resumed.state_digest(), first.state_digest());
    assert_eq!(resumed.last_sequence(), Some(SNAPSHOT_AT as u64));
    assert_eq!(resumed.events(), first.events());

    for tx in &log[SNAPSHOT_AT..] {
        resumed.apply(tx).unwrap();
    }
    assert_eq!(resumed.state_digest_hex(), straight.state_digest_hex());
    assert_eq!(resumed.trade_root(), straight.trade_root());
    assert_eq!(resumed.events(), straight.events());
}

#[test]
fn restored_exchange_keeps_ordering_guard() {
    let log = log();
    let config = EngineConfig::default();
    let mut ex = Exchange::new(config.clone()).unwrap();
    for tx in &log[..SNAPSHOT_AT] {
        ex.apply(tx).unwrap();
    }
    let mut store = MemoryStore::new();
    ex.persist(&mut store).unwrap();

    let mut resumed = Exchange::restore(config, &store).unwrap();
    let err = resumed.apply(&log[SNAPSHOT_AT - 1]).unwrap_err();
    assert!(matches!(err, ChainmatchError::StaleTransaction { .. }));
}

#[test]
fn persist_replaces_previous_snapshot() {
    let log = log();
    let config = EngineConfig::default();
    let mut ex = Exchange::new(config.clone()).unwrap();
    let mut store = MemoryStore::new();

    for tx in &log {
        ex.apply(tx).unwrap();
        ex.persist(&mut store).unwrap();
    }
    let restored = Exchange::restore(config, &store).unwrap();
    assert_eq!(restored.state_digest(), ex.state_digest());

    let orders = store.scan_prefix(store::ORDER_PREFIX).unwrap();
    assert_eq!(orders.len(), 6);
}

#[test]
fn restore_rejects_other_configuration() {
    let mut ex = Exchange::new(EngineConfig::default()).unwrap();
    ex.apply(&log()[0]).unwrap();
    let mut store = MemoryStore::new();
    ex.persist(&mut store).unwrap();

    let other = EngineConfig {
        taker_fee_bps: 25,
        ..EngineConfig::default()
    };
    let err = Exchange::restore(other, &store).unwrap_err();
    assert!(matches!(err, ChainmatchError::Configuration(_)));
}

#[test]
fn restore_from_empty_store_fails() {
    let err = Exchange::restore(EngineConfig::default(), &MemoryStore::new()).unwrap_err();
    assert!(matches!(err, ChainmatchError::Store(_)));
}

#[test]
fn corrupt_record_is_reported() {
    let mut ex = Exchange::new(EngineConfig::default()).unwrap();
    for tx in &log()[..SNAPSHOT_AT] {
        ex.apply(tx).unwrap();
    }
    let mut store = MemoryStore::new();
    ex.persist(&mut store).unwrap();
    store
        .put(&format!("{}{}", store::ORDER_PREFIX, OrderId::from_bytes([1; 16])), b"{".to_vec())
        .unwrap();

    let err = Exchange::restore(EngineConfig::default(), &store).unwrap_err();
    assert!(matches!(err, ChainmatchError::Store(_)));
}
