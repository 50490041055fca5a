//! # chainmatch-matchcore
//!
//! The passive data structures the matching engine walks.
//!
//! - [`OrderBook`]: per-asset bids and asks in strict price-then-time
//!   priority, one FIFO [`PriceLevel`] per price
//! - [`OrderStore`]: every order record ever accepted, keyed by id, with
//!   monotone status updates
//! - [`determinism`]: trade roots and whole-state digests that let two
//!   executors prove they replayed a log identically
//!
//! Nothing here touches balances or emits events.

pub mod determinism;
pub mod order_store;
pub mod orderbook;
pub mod price_level;

pub use determinism::{StateHasher, compute_trade_root, verify_trade_root};
pub use order_store::OrderStore;
pub use orderbook::{BookSnapshot, DepthLevel, OrderBook};
pub use price_level::{BookEntry, PriceLevel};
