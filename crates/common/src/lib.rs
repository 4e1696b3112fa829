//! Identifier types shared by every layer of the order saga system.

mod types;

pub use types::{CorrelationId, IdempotencyKey, InvalidIdentifier, OrderId};
