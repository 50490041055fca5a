//! Transactions: the closed set of operations the engine accepts.
//!
//! The external sequencer assigns every transaction a position in a single
//! total order (`sequence`) and a logical timestamp; the identity provider
//! supplies the authenticated caller. Together these form the [`TxContext`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, LogicalTime, OrderId, OrderSide, Role};

/// Ordering and identity metadata supplied with every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    /// Strictly increasing position in the agreed log.
    pub sequence: u64,
    /// Authenticated submitter.
    pub caller: AccountId,
    /// Logical "now"; never decreases along the log.
    pub now: LogicalTime,
}

impl TxContext {
    #[must_use]
    pub fn new(sequence: u64, caller: AccountId, now: LogicalTime) -> Self {
        Self {
            sequence,
            caller,
            now,
        }
    }
}

/// Payload of a PlaceOrder transaction. The owner is always the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub asset_id: AssetId,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub expires_at: LogicalTime,
}

/// Every state transition the engine knows how to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operation {
    RegisterAccount {
        account: AccountId,
        role: Role,
    },
    CreateAsset {
        asset_id: AssetId,
        name: String,
        total_supply: Decimal,
    },
    Deposit {
        asset_id: AssetId,
        amount: Decimal,
    },
    Withdraw {
        asset_id: AssetId,
        amount: Decimal,
    },
    PlaceOrder(PlaceOrder),
    CancelOrder {
        order_id: OrderId,
    },
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterAccount { .. } => "RegisterAccount",
            Self::CreateAsset { .. } => "CreateAsset",
            Self::Deposit { .. } => "Deposit",
            Self::Withdraw { .. } => "Withdraw",
            Self::PlaceOrder(_) => "PlaceOrder",
            Self::CancelOrder { .. } => "CancelOrder",
        }
    }
}

/// One entry of the ordered transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub context: TxContext,
    pub operation: Operation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_order_json_roundtrip() {
        let tx = Transaction {
            context: TxContext::new(4, AccountId::from_bytes([1; 16]), LogicalTime(9)),
            operation: Operation::PlaceOrder(PlaceOrder {
                order_id: OrderId::from_bytes([2; 16]),
                asset_id: AssetId::new("GOLD"),
                side: OrderSide::Sell,
                price: Decimal::new(95, 1),
                quantity: Decimal::new(30, 0),
                expires_at: LogicalTime(100),
            }),
        };
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"op\":\"PlaceOrder\""));
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn malformed_side_is_rejected_at_decode() {
        let json = r#"{"op":"PlaceOrder","order_id":"00000000-0000-0000-0000-000000000001",
            "asset_id":"GOLD","side":"Hold","price":"1","quantity":"1","expires_at":5}"#;
        assert!(serde_json::from_str::<Operation>(json).is_err());
    }

    #[test]
    fn operation_names() {
        let op = Operation::CancelOrder {
            order_id: OrderId::from_bytes([0; 16]),
        };
        assert_eq!(op.name(), "CancelOrder");
    }
}
