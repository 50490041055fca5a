//! # chainmatch-ledger
//!
//! **AccountLedger**: the only component allowed to write balances.
//!
//! ## Primitives
//!
//! 1. **deposit / withdraw**: value entering or leaving the engine
//! 2. **escrow / release**: available <-> escrowed for one (account, asset)
//! 3. **settle**: one fill, moving escrowed value between buyer, seller and
//!    the protocol-fee account in a single all-or-nothing step
//!
//! [`AccountLedger::atomically`] groups several primitives into one
//! journaled scope that is rolled back if any of them fails.
//!
//! ## Invariant
//!
//! ```text
//! ∀ asset: Σ(available + escrowed) == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! Matching only moves value between accounts; [`SupplyConservation`]
//! checks that nothing was created or destroyed.

pub mod account_ledger;
pub mod fee;
pub mod supply_conservation;

pub use account_ledger::{AccountLedger, SettleInstruction, SettlementReceipt};
pub use fee::FeeSchedule;
pub use supply_conservation::SupplyConservation;
