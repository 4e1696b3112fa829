use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId};
use domain::{IdempotencyRecord, NewSagaLogEntry, Order, SagaLogEntry};

use crate::Result;

/// Create/read/update-by-id contract over the order entity.
///
/// Writes must be visible to subsequent reads immediately.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order. Fails with `Conflict` if the id exists.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Overwrites the mutable fields of an existing order.
    async fn update_order(&self, order: &Order) -> Result<()>;
}

/// Append-only saga audit log.
#[async_trait]
pub trait SagaLogStore: Send + Sync {
    /// Appends a row and returns it with its assigned id.
    async fn append_entry(&self, entry: NewSagaLogEntry) -> Result<SagaLogEntry>;

    /// Returns every row of a saga, ordered by creation time then id.
    async fn entries_for_saga(&self, saga_id: OrderId) -> Result<Vec<SagaLogEntry>>;
}

/// Outcome of trying to bind an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The record was inserted (or replaced an expired one); the caller owns the key.
    Acquired,
    /// A live record already holds the key.
    Existing(IdempotencyRecord),
}

/// Idempotency key table.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically inserts `record` unless a live record already holds its key.
    ///
    /// This is a single storage operation: two concurrent claims for the
    /// same key never both observe `Acquired`.
    async fn claim(&self, record: IdempotencyRecord, now: DateTime<Utc>) -> Result<Claim>;

    /// Loads the record for a key.
    async fn get_record(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    /// Stores the final response. A record can be completed only once.
    async fn complete(&self, key: &IdempotencyKey, status: u16, body: &str) -> Result<()>;

    /// Deletes records expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Everything the saga coordinator needs from storage.
pub trait SagaStore: OrderRepository + SagaLogStore + IdempotencyStore + Clone + 'static {}

impl<T> SagaStore for T where
    T: OrderRepository + SagaLogStore + IdempotencyStore + Clone + 'static
{
}
