//! Supply conservation invariant checker.
//!
//! Mathematical invariant enforced after every state-changing transaction:
//! ```text
//! ∀ asset: Σ(available + escrowed) == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! The protocol-fee account is an ordinary account, so fees move value
//! without breaking the equation. A mismatch means value was created or
//! destroyed by matching, which is always a bug.

use std::collections::{BTreeMap, BTreeSet};

use chainmatch_types::{AssetId, ChainmatchError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tracks per-asset external flows and validates conservation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyConservation {
    /// Total deposits per asset since genesis.
    deposits: BTreeMap<AssetId, Decimal>,
    /// Total withdrawals per asset since genesis.
    withdrawals: BTreeMap<AssetId, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `Validation` if the running total would overflow; nothing is recorded.
    pub fn record_deposit(&mut self, asset: &AssetId, amount: Decimal) -> Result<()> {
        accumulate(&mut self.deposits, asset, amount)
    }

    pub fn record_withdrawal(&mut self, asset: &AssetId, amount: Decimal) -> Result<()> {
        accumulate(&mut self.withdrawals, asset, amount)
    }

    /// Expected total supply for an asset: deposits - withdrawals.
    #[must_use]
    pub fn expected_supply(&self, asset: &AssetId) -> Decimal {
        self.total_deposits(asset) - self.total_withdrawals(asset)
    }

    /// Compare the actual supply (sum of all balances) with the expected one.
    ///
    /// # Errors
    /// Returns [`ChainmatchError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, asset: &AssetId, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(asset);
        if actual_supply != expected {
            return Err(ChainmatchError::SupplyInvariantViolation {
                reason: format!(
                    "Asset {asset}: actual supply {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(asset),
                    self.total_withdrawals(asset),
                ),
            });
        }
        Ok(())
    }

    /// All assets that ever saw an external flow, in sorted order.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetId> {
        let assets: BTreeSet<&AssetId> =
            self.deposits.keys().chain(self.withdrawals.keys()).collect();
        assets.into_iter().cloned().collect()
    }

    #[must_use]
    pub fn total_deposits(&self, asset: &AssetId) -> Decimal {
        self.deposits.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn total_withdrawals(&self, asset: &AssetId) -> Decimal {
        self.withdrawals.get(asset).copied().unwrap_or(Decimal::ZERO)
    }
}

fn accumulate(totals: &mut BTreeMap<AssetId, Decimal>, asset: &AssetId, amount: Decimal) -> Result<()> {
    let total = totals
        .get(asset)
        .copied()
        .unwrap_or(Decimal::ZERO)
        .checked_add(amount)
        .ok_or_else(|| ChainmatchError::validation(format!("{asset} supply overflow")))?;
    totals.insert(asset.clone(), total);
    Ok(())
}
