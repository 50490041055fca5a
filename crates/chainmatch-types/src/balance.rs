//! Balance tracking types for the escrow model.
//!
//! Every (account, asset) pair has an `available` balance (usable for new
//! orders and withdrawals) and an `escrowed` balance (reserved by resting
//! orders until they fill, are cancelled, or expire).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single balance entry for an (account, asset) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Usable for new orders / withdrawal.
    pub available: Decimal,
    /// Reserved against open orders.
    pub escrowed: Decimal,
}

impl BalanceEntry {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            escrowed: Decimal::ZERO,
        }
    }

    /// Total balance (available + escrowed).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.escrowed
    }

    /// Whether this entry has no balance at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.escrowed.is_zero()
    }

    /// Both components are non-negative.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.available.is_sign_negative() && !self.escrowed.is_sign_negative()
    }
}

impl Default for BalanceEntry {
    fn default() -> Self {
        Self::new()
    }
}
