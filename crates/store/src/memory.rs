use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId};
use domain::{IdempotencyRecord, NewSagaLogEntry, Order, SagaLogEntry};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{Claim, IdempotencyStore, OrderRepository, SagaLogStore},
};

/// In-memory implementation of every store contract.
///
/// Clones share the same underlying maps, so a test can hand one clone to
/// the coordinator and inspect another.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    saga_log: Arc<RwLock<Vec<SagaLogEntry>>>,
    idempotency: Arc<RwLock<HashMap<IdempotencyKey, IdempotencyRecord>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns the total number of audit rows across all sagas.
    pub async fn log_entry_count(&self) -> usize {
        self.saga_log.read().await.len()
    }

    /// Returns the number of idempotency records.
    pub async fn idempotency_record_count(&self) -> usize {
        self.idempotency.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id()
            )));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id())
            .ok_or(StoreError::OrderNotFound(order.id()))?;
        *stored = order.clone();
        Ok(())
    }
}

#[async_trait]
impl SagaLogStore for InMemoryStore {
    async fn append_entry(&self, entry: NewSagaLogEntry) -> Result<SagaLogEntry> {
        let mut log = self.saga_log.write().await;
        let entry = entry.into_entry(log.len() as i64 + 1);
        log.push(entry.clone());
        Ok(entry)
    }

    async fn entries_for_saga(&self, saga_id: OrderId) -> Result<Vec<SagaLogEntry>> {
        let log = self.saga_log.read().await;
        let mut entries: Vec<_> = log
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn claim(&self, record: IdempotencyRecord, now: DateTime<Utc>) -> Result<Claim> {
        // Check and insert happen under one write lock.
        let mut records = self.idempotency.write().await;
        if let Some(existing) = records.get(&record.key)
            && !existing.is_expired(now)
        {
            return Ok(Claim::Existing(existing.clone()));
        }
        records.insert(record.key.clone(), record);
        Ok(Claim::Acquired)
    }

    async fn get_record(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        Ok(self.idempotency.read().await.get(key).cloned())
    }

    async fn complete(&self, key: &IdempotencyKey, status: u16, body: &str) -> Result<()> {
        let mut records = self.idempotency.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
        if record.is_complete() {
            return Err(StoreError::Conflict(format!(
                "idempotency key {key} already has a response"
            )));
        }
        record.response_status = Some(status);
        record.response_body = Some(body.to_string());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut records = self.idempotency.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}
