//! # chainmatch-engine
//!
//! Deterministic exchange state machine for ledger-embedded markets.
//!
//! Every executor feeds the same ordered transaction log into an
//! [`Exchange`] and ends up with bit-identical state. The crate provides:
//!
//! - [`Exchange`]: transaction dispatch, ordering guard, queries, digests
//! - [`MatchingEngine`]: continuous limit-order matching with escrowed settlement
//! - [`LifecycleManager`]: cancellation and escrow release
//! - [`EventRecorder`]: append-only event log with pluggable [`EventSink`]s
//! - [`StateStore`]: key-value snapshot boundary with a [`MemoryStore`]
//!
//! ## Transaction pipeline
//!
//! ```text
//! Transaction ──▶ ordering guard ──▶ dispatch ──▶ commit ──▶ events
//!                 (sequence, time)    (one op)     (cursor)    (log + sink)
//! ```
//!
//! A transaction either commits completely or leaves no trace.

pub mod exchange;
pub mod lifecycle;
pub mod matching;
pub mod recorder;
pub mod store;

pub use exchange::{Exchange, TxReceipt};
pub use lifecycle::{LifecycleManager, escrow_requirement};
pub use matching::{MatchOutcome, MatchingEngine, PlanStep, plan, validate_order};
pub use recorder::{EventRecorder, EventSink, JsonLinesSink, MemorySink};
pub use store::{MemoryStore, StateStore};
