//! Error types for the chainmatch engine.
//!
//! All errors use the `CM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Balance errors
//! - 3xx: Authorization errors
//! - 4xx: Lookup errors
//! - 5xx: Order lifecycle errors
//! - 6xx: Transaction ordering errors
//! - 8xx: Invariant violations
//! - 9xx: General / internal errors
//!
//! Every variant maps onto one coarse [`ErrorKind`] that callers branch on.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountId, AssetId, LogicalTime, OrderId, OrderStatus};

/// Central error enum for all chainmatch operations.
#[derive(Debug, Error)]
pub enum ChainmatchError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Malformed request: non-positive price or quantity, bad precision, etc.
    #[error("CM_ERR_100: Validation failed: {reason}")]
    Validation { reason: String },

    /// An order with this ID already exists.
    #[error("CM_ERR_101: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// An account with this ID is already registered.
    #[error("CM_ERR_102: Account already registered: {0}")]
    DuplicateAccount(AccountId),

    /// An asset with this ID already exists.
    #[error("CM_ERR_103: Asset already exists: {0}")]
    DuplicateAsset(AssetId),

    /// Too many resting orders for this account.
    #[error("CM_ERR_104: Open order limit {limit} reached for account {account}")]
    OrderLimitExceeded { account: AccountId, limit: usize },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("CM_ERR_200: Insufficient {asset} balance: need {needed}, have {available}")]
    InsufficientBalance {
        asset: AssetId,
        needed: Decimal,
        available: Decimal,
    },

    /// Not enough escrowed balance to release or settle.
    #[error("CM_ERR_201: Insufficient {asset} escrow: need {needed}, have {escrowed}")]
    InsufficientEscrow {
        asset: AssetId,
        needed: Decimal,
        escrowed: Decimal,
    },

    // =================================================================
    // Authorization Errors (3xx)
    // =================================================================
    /// The caller may not perform this action.
    #[error("CM_ERR_300: Unauthorized action: {reason}")]
    Unauthorized { reason: String },

    // =================================================================
    // Lookup Errors (4xx)
    // =================================================================
    #[error("CM_ERR_400: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("CM_ERR_401: Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("CM_ERR_402: Asset not found: {0}")]
    AssetNotFound(AssetId),

    // =================================================================
    // Lifecycle Errors (5xx)
    // =================================================================
    /// The order is already Filled, Cancelled or Expired.
    #[error("CM_ERR_500: Order {order_id} already closed ({status})")]
    AlreadyClosed {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The order's expiry has passed.
    #[error("CM_ERR_501: Order {order_id} expired at {expires_at} (now {now})")]
    Expired {
        order_id: OrderId,
        expires_at: LogicalTime,
        now: LogicalTime,
    },

    /// A status change that would regress the order lifecycle.
    #[error("CM_ERR_502: Illegal status transition {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    // =================================================================
    // Transaction Ordering Errors (6xx)
    // =================================================================
    /// Sequence number not strictly greater than the last applied one.
    #[error("CM_ERR_600: Stale transaction: sequence {sequence} <= last applied {last}")]
    StaleTransaction { sequence: u64, last: u64 },

    /// Logical time moved backwards.
    #[error("CM_ERR_601: Logical time regression: {now} < {last}")]
    TimeRegression { now: LogicalTime, last: LogicalTime },

    // =================================================================
    // Invariant Violations (8xx)
    // =================================================================
    /// Supply conservation invariant violated. The state is unsound.
    #[error("CM_ERR_800: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("CM_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("CM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    #[error("CM_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// The external state store failed.
    #[error("CM_ERR_903: State store error: {0}")]
    Store(String),

    #[error("CM_ERR_904: I/O error: {0}")]
    Io(String),
}

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InsufficientBalance,
    Unauthorized,
    NotFound,
    AlreadyClosed,
    Expired,
    Internal,
}

impl ChainmatchError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. }
            | Self::DuplicateOrder(_)
            | Self::DuplicateAccount(_)
            | Self::DuplicateAsset(_)
            | Self::OrderLimitExceeded { .. }
            | Self::StaleTransaction { .. }
            | Self::TimeRegression { .. } => ErrorKind::Validation,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::OrderNotFound(_) | Self::AccountNotFound(_) | Self::AssetNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AlreadyClosed { .. } | Self::IllegalTransition { .. } => {
                ErrorKind::AlreadyClosed
            }
            Self::Expired { .. } => ErrorKind::Expired,
            Self::InsufficientEscrow { .. }
            | Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Store(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a [`ChainmatchError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`ChainmatchError::Unauthorized`].
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ChainmatchError>;

impl From<std::io::Error> for ChainmatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainmatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = ChainmatchError::OrderNotFound(OrderId::from_bytes([0; 16]));
        let msg = format!("{err}");
        assert!(msg.starts_with("CM_ERR_400"), "Got: {msg}");
    }

    #[test]
    fn insufficient_balance_display() {
        let err = ChainmatchError::InsufficientBalance {
            asset: AssetId::new("ETH"),
            needed: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("CM_ERR_200"));
        assert!(msg.contains("ETH"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ChainmatchError::validation("qty").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ChainmatchError::unauthorized("not owner").kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            ChainmatchError::AssetNotFound(AssetId::new("X")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ChainmatchError::AlreadyClosed {
                order_id: OrderId::from_bytes([0; 16]),
                status: OrderStatus::Filled,
            }
            .kind(),
            ErrorKind::AlreadyClosed
        );
        assert_eq!(
            ChainmatchError::Expired {
                order_id: OrderId::from_bytes([0; 16]),
                expires_at: LogicalTime(1),
                now: LogicalTime(2),
            }
            .kind(),
            ErrorKind::Expired
        );
        assert_eq!(
            ChainmatchError::SupplyInvariantViolation {
                reason: "x".into()
            }
            .kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn all_errors_have_cm_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(ChainmatchError::Internal("test".into())),
            Box::new(ChainmatchError::StaleTransaction {
                sequence: 1,
                last: 2,
            }),
            Box::new(ChainmatchError::IllegalTransition {
                from: OrderStatus::Filled,
                to: OrderStatus::Open,
            }),
            Box::new(ChainmatchError::Store("down".into())),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("CM_ERR_"),
                "Error missing CM_ERR_ prefix: {msg}"
            );
        }
    }

    #[test]
    fn serde_error_converts() {
        let err: ChainmatchError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(matches!(err, ChainmatchError::Serialization(_)));
    }
}
