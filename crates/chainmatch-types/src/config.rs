//! Engine configuration.
//!
//! Every executor replaying a log must run with the same configuration;
//! [`EngineConfig::fingerprint`] makes that checkable.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, ChainmatchError, Result, constants};

/// Configuration shared by all executors of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reference currency every asset is priced in.
    pub quote_asset: AssetId,
    /// Flat fee charged to the taker on what it receives, in basis points.
    pub taker_fee_bps: u32,
    /// Account credited with every taker fee.
    pub fee_account: AccountId,
    /// Resting orders allowed per account across all books.
    pub max_open_orders_per_account: usize,
    /// Check supply conservation after every state-changing transaction.
    pub verify_conservation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_asset: AssetId::new(constants::DEFAULT_QUOTE_ASSET),
            taker_fee_bps: constants::DEFAULT_TAKER_FEE_BPS,
            fee_account: AccountId::from_bytes(constants::DEFAULT_FEE_ACCOUNT_BYTES),
            max_open_orders_per_account: constants::DEFAULT_MAX_OPEN_ORDERS_PER_ACCOUNT,
            verify_conservation: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ChainmatchError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no executor should run with.
    pub fn validate(&self) -> Result<()> {
        if self.quote_asset.as_str().trim().is_empty() {
            return Err(ChainmatchError::Configuration(
                "quote_asset must not be empty".to_string(),
            ));
        }
        if self.taker_fee_bps > constants::BPS_DENOMINATOR {
            return Err(ChainmatchError::Configuration(format!(
                "taker_fee_bps {} exceeds {}",
                self.taker_fee_bps,
                constants::BPS_DENOMINATOR
            )));
        }
        if self.max_open_orders_per_account == 0 {
            return Err(ChainmatchError::Configuration(
                "max_open_orders_per_account must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Taker fee as a fraction (10 bps -> 0.001).
    #[must_use]
    pub fn taker_fee_rate(&self) -> Decimal {
        Decimal::from(self.taker_fee_bps) / Decimal::from(constants::BPS_DENOMINATOR)
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}
