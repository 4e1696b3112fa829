//! Domain error types.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order status cannot move from `current` to `requested`.
    #[error("Invalid status transition: cannot move from {current} to {requested}")]
    InvalidStatusTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// Amount must be strictly positive.
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: Decimal },

    /// Unknown status name read back from storage.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// A required text field was empty.
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}
