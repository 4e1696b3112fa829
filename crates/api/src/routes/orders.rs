//! Create-order and inspection endpoints.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use common::{CorrelationId, IdempotencyKey, OrderId};
use domain::{Order, SagaLogEntry};
use rust_decimal::Decimal;
use saga::{
    CORRELATION_ID_HEADER, CreateOrderRequest, InventoryService, PaymentService, SagaCoordinator,
    cancel_pair,
};
use serde::{Deserialize, Serialize};
use store::SagaStore;

use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "idempotent-replayed";

pub type DynInventory = Arc<dyn InventoryService>;
pub type DynPayment = Arc<dyn PaymentService>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStore> {
    pub coordinator: SagaCoordinator<S, DynInventory, DynPayment>,
    /// Deadline after which an in-flight saga is cancelled.
    pub saga_timeout: Duration,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderBody {
    pub user_id: String,
    pub product_id: String,
    pub amount: AmountInput,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// An amount given either as a JSON string (`"50.00"`) or a number (`50`).
#[derive(Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn to_decimal(&self) -> Result<Decimal, ApiError> {
        let raw = match self {
            AmountInput::Text(text) => text.trim().to_string(),
            AmountInput::Number(number) => number.to_string(),
        };
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|_| ApiError::BadRequest(format!("Invalid amount: {raw}")))
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub amount: String,
    pub quantity: u32,
    pub status: String,
    pub payment_reference: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            product_id: order.product_id().to_string(),
            amount: order.amount().to_string(),
            quantity: order.quantity(),
            status: order.status().to_string(),
            payment_reference: order.payment_reference().map(str::to_string),
            created_at: order.created_at().to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct SagaHistoryResponse {
    pub saga_id: String,
    pub order_status: String,
    pub steps: Vec<SagaLogEntry>,
}

// -- Handlers --

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::from_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}

/// POST /orders: run the create-order saga.
///
/// The saga runs on its own task. Dropping this handler (client went away)
/// or hitting the saga deadline cancels it at its next participant call.
#[tracing::instrument(skip_all)]
pub async fn create<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let correlation_id = CorrelationId::or_generate(header_str(&headers, CORRELATION_ID_HEADER));

    let amount = body.amount.to_decimal()?;
    let mut request = CreateOrderRequest::new(body.user_id, body.product_id, amount)
        .with_quantity(body.quantity.unwrap_or(1))
        .with_correlation_id(correlation_id.clone());
    if let Some(raw) = header_str(&headers, IDEMPOTENCY_KEY_HEADER) {
        let key = IdempotencyKey::parse(raw)
            .map_err(|e| ApiError::BadRequest(format!("Invalid Idempotency-Key: {e}")))?;
        request = request.with_idempotency_key(key);
    }

    let (handle, signal) = cancel_pair();
    let saga_state = state.clone();
    let mut task =
        tokio::spawn(async move { saga_state.coordinator.create_order(request, signal).await });

    let joined = match tokio::time::timeout(state.saga_timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::warn!(timeout = ?state.saga_timeout, "saga deadline reached, cancelling");
            handle.cancel();
            task.await
        }
    };
    drop(handle);
    let reply = joined.map_err(|e| ApiError::Internal(format!("saga task failed: {e}")))?;

    let status =
        StatusCode::from_u16(reply.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(reply.outcome)).into_response();
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    if reply.replayed {
        response
            .headers_mut()
            .insert(IDEMPOTENT_REPLAYED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

/// GET /orders/{id}: load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .coordinator
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/saga: the saga audit trail of an order.
#[tracing::instrument(skip(state))]
pub async fn saga_history<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaHistoryResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .coordinator
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let steps = state.coordinator.history(order_id).await?;

    Ok(Json(SagaHistoryResponse {
        saga_id: order_id.to_string(),
        order_status: order.status().to_string(),
        steps,
    }))
}
