//! Accounts and assets.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, BalanceEntry};

/// Permission level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Role {
    /// May create assets and register other admins.
    Admin,
    Trader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::Trader => write!(f, "TRADER"),
        }
    }
}

/// A registered account and its per-asset balances.
///
/// Balances are keyed by a `BTreeMap` so iteration order (and therefore any
/// digest computed over it) is identical on every executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub role: Role,
    pub balances: BTreeMap<AssetId, BalanceEntry>,
}

impl Account {
    #[must_use]
    pub fn new(id: AccountId, role: Role) -> Self {
        Self {
            id,
            role,
            balances: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Balance for `asset`, zero if the account never held it.
    #[must_use]
    pub fn balance(&self, asset: &AssetId) -> BalanceEntry {
        self.balances.get(asset).cloned().unwrap_or_default()
    }
}

/// A tradable asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    /// Informational only; never enforced as a cap.
    pub total_supply: Decimal,
}

impl Asset {
    #[must_use]
    pub fn new(id: AssetId, name: impl Into<String>, total_supply: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            total_supply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_balance_is_zero() {
        let account = Account::new(AccountId::from_bytes([1; 16]), Role::Trader);
        assert!(account.balance(&AssetId::new("ETH")).is_zero());
        assert!(!account.is_admin());
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Admin.to_string(), "ADMIN");
        assert_eq!(Role::Trader.to_string(), "TRADER");
    }

    #[test]
    fn account_serde_roundtrip() {
        let mut account = Account::new(AccountId::from_bytes([2; 16]), Role::Admin);
        account.balances.insert(
            AssetId::new("GOLD"),
            BalanceEntry {
                available: Decimal::new(12345, 2),
                escrowed: Decimal::new(5, 0),
            },
        );
        let json = serde_json::to_string(&account).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(account, back);
    }
}
