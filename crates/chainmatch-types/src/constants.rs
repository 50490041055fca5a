//! System-wide constants for the chainmatch engine.

/// Maximum decimal places accepted for prices.
pub const PRICE_PRECISION: u32 = 8;

/// Maximum decimal places accepted for quantities.
pub const QTY_PRECISION: u32 = 8;

/// Decimal places fees are rounded (toward zero) to.
pub const FEE_PRECISION: u32 = 8;

/// Default quote (reference) currency.
pub const DEFAULT_QUOTE_ASSET: &str = "ETH";

/// Default flat taker fee in basis points (0.1%).
pub const DEFAULT_TAKER_FEE_BPS: u32 = 10;

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Default id of the protocol-fee account.
pub const DEFAULT_FEE_ACCOUNT_BYTES: [u8; 16] = [0xFE; 16];

/// Maximum resting orders per account (all assets).
pub const DEFAULT_MAX_OPEN_ORDERS_PER_ACCOUNT: usize = 200;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "chainmatch";
