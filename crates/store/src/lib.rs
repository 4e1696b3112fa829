//! Storage for the order saga system.
//!
//! Three contracts back the coordinator: the order record store, the
//! append-only saga audit log, and the idempotency key table. Each has an
//! in-memory implementation for tests and local runs and a PostgreSQL one.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{Claim, IdempotencyStore, OrderRepository, SagaLogStore, SagaStore};
