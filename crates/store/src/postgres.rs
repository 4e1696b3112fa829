use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, IdempotencyKey, OrderId};
use domain::{
    IdempotencyRecord, Money, NewSagaLogEntry, Order, OrderParts, OrderStatus, ProductId,
    SagaLogEntry, StepStatus, UserId,
};
use rust_decimal::Decimal;
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Claim, IdempotencyStore, OrderRepository, SagaLogStore},
};

const ORDER_COLUMNS: &str = "id, user_id, product_id, amount, quantity, status, payment_reference, created_at, updated_at";

const SAGA_LOG_COLUMNS: &str = "id, saga_id, saga_type, step, status, payload, error, correlation_id, created_at, completed_at";

const IDEMPOTENCY_COLUMNS: &str =
    "key, operation_path, request_hash, response_status, response_body, created_at, expires_at";

/// Insert attempts per claim when the conflicting row disappears under us.
const CLAIM_ATTEMPTS: u32 = 2;

/// PostgreSQL-backed implementation of every store contract.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let amount: Decimal = row.try_get("amount")?;
        let quantity: i32 = row.try_get("quantity")?;
        let status: String = row.try_get("status")?;

        Ok(Order::from_parts(OrderParts {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            amount: Money::new(amount).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::Corrupt(format!("negative quantity {quantity}")))?,
            status: status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            payment_reference: row.try_get("payment_reference")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    fn row_to_entry(row: PgRow) -> Result<SagaLogEntry> {
        let status: String = row.try_get("status")?;

        Ok(SagaLogEntry {
            id: row.try_get("id")?,
            saga_id: OrderId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            saga_type: row.try_get("saga_type")?,
            step: row.try_get("step")?,
            status: StepStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown step status {status}")))?,
            payload: row.try_get("payload")?,
            error: row.try_get("error")?,
            correlation_id: row
                .try_get::<Option<String>, _>("correlation_id")?
                .map(CorrelationId::new),
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn row_to_record(row: PgRow) -> Result<IdempotencyRecord> {
        let key: String = row.try_get("key")?;
        let response_status: Option<i32> = row.try_get("response_status")?;

        Ok(IdempotencyRecord {
            key: IdempotencyKey::parse(key).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            operation_path: row.try_get("operation_path")?,
            request_hash: row.try_get("request_hash")?,
            response_status: response_status
                .map(u16::try_from)
                .transpose()
                .map_err(|_| StoreError::Corrupt("response status out of range".to_string()))?,
            response_body: row.try_get("response_body")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    /// Inserts `record`, or takes over an expired row, in one statement.
    /// Returns false when a live row holds the key.
    async fn try_claim(&self, record: &IdempotencyRecord, now: DateTime<Utc>) -> Result<bool> {
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO idempotency_keys (key, operation_path, request_hash, response_status, response_body, created_at, expires_at)
            VALUES ($1, $2, $3, NULL, NULL, $4, $5)
            ON CONFLICT (key) DO UPDATE
            SET operation_path = EXCLUDED.operation_path,
                request_hash = EXCLUDED.request_hash,
                response_status = NULL,
                response_body = NULL,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_keys.expires_at <= $6
            RETURNING key
            "#,
        )
        .bind(record.key.as_str())
        .bind(&record.operation_path)
        .bind(&record.request_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.is_some())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, product_id, amount, quantity, status, payment_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_str())
        .bind(order.product_id().as_str())
        .bind(order.amount().amount())
        .bind(order.quantity() as i32)
        .bind(order.status().as_str())
        .bind(order.payment_reference())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::Conflict(format!("order {} already exists", order.id()));
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), status = %order.status()))]
    async fn update_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_reference = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_reference())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.id()));
        }
        Ok(())
    }
}

#[async_trait]
impl SagaLogStore for PostgresStore {
    async fn append_entry(&self, entry: NewSagaLogEntry) -> Result<SagaLogEntry> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO saga_log (saga_id, saga_type, step, status, payload, error, correlation_id, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(entry.saga_id.as_uuid())
        .bind(&entry.saga_type)
        .bind(&entry.step)
        .bind(entry.status.as_str())
        .bind(&entry.payload)
        .bind(&entry.error)
        .bind(entry.correlation_id.as_ref().map(CorrelationId::as_str))
        .bind(entry.created_at)
        .bind(entry.completed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry.into_entry(id))
    }

    async fn entries_for_saga(&self, saga_id: OrderId) -> Result<Vec<SagaLogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {SAGA_LOG_COLUMNS} FROM saga_log WHERE saga_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}

#[async_trait]
impl IdempotencyStore for PostgresStore {
    #[tracing::instrument(skip(self, record), fields(key = %record.key))]
    async fn claim(&self, record: IdempotencyRecord, now: DateTime<Utc>) -> Result<Claim> {
        for attempt in 1..=CLAIM_ATTEMPTS {
            if self.try_claim(&record, now).await? {
                return Ok(Claim::Acquired);
            }
            // A concurrent purge can delete the row between the two statements.
            match self.get_record(&record.key).await? {
                Some(existing) => return Ok(Claim::Existing(existing)),
                None => tracing::debug!(attempt, "claimed key was purged, retrying"),
            }
        }
        Err(StoreError::Conflict(format!(
            "idempotency key {} vanished during claim",
            record.key
        )))
    }

    async fn get_record(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {IDEMPOTENCY_COLUMNS} FROM idempotency_keys WHERE key = $1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn complete(&self, key: &IdempotencyKey, status: u16, body: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET response_status = $2, response_body = $3
            WHERE key = $1 AND response_status IS NULL
            "#,
        )
        .bind(key.as_str())
        .bind(i32::from(status))
        .bind(body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_record(key).await? {
                Some(_) => Err(StoreError::Conflict(format!(
                    "idempotency key {key} already has a response"
                ))),
                None => Err(StoreError::KeyNotFound(key.to_string())),
            };
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
