//! Domain layer for the order saga system.
//!
//! This crate provides the records the saga coordinator reads and writes:
//! - `Order` entity with a monotonic status machine
//! - `SagaLogEntry` audit rows
//! - `IdempotencyRecord` request deduplication entries

pub mod error;
pub mod idempotency;
pub mod order;
pub mod saga_log;

pub use error::OrderError;
pub use idempotency::{DEFAULT_IDEMPOTENCY_TTL_HOURS, IdempotencyRecord};
pub use order::{Money, Order, OrderParts, OrderStatus, ProductId, UserId};
pub use saga_log::{NewSagaLogEntry, SagaLogEntry, StepStatus};
