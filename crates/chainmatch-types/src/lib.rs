//! # chainmatch-types
//!
//! Shared types, errors, and configuration for the **chainmatch** engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`AssetId`], [`OrderId`], [`TradeId`], [`LogicalTime`]
//! - **Account model**: [`Account`], [`Role`], [`BalanceEntry`], [`Asset`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`]
//! - **Trade model**: [`Trade`]
//! - **Events**: [`EngineEvent`] for external observers
//! - **Transactions**: [`TxContext`], [`Operation`], [`PlaceOrder`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`ChainmatchError`] with `CM_ERR_` prefix codes, [`ErrorKind`]
//! - **Constants**: precision limits and defaults

pub mod account;
pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod order;
pub mod trade;
pub mod tx;

pub use account::*;
pub use balance::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use order::*;
pub use trade::*;
pub use tx::*;

// Constants are accessed via `chainmatch_types::constants::FOO`.
