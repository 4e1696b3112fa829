//! Saga error types.

use common::IdempotencyKey;
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

/// Errors raised inside the saga crate.
///
/// None of these escape [`SagaCoordinator::create_order`](crate::SagaCoordinator::create_order);
/// the coordinator turns them into an `ERROR` outcome.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The key is bound to a different request.
    #[error("Idempotency key {key} was reused for a different request")]
    IdempotencyConflict { key: IdempotencyKey },

    /// Order invariant violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
