//! HTTP participant clients against an in-process stub server.

use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use common::{CorrelationId, OrderId};
use domain::{Money, OrderStatus, ProductId, UserId};
use rust_decimal::Decimal;
use saga::{
    CallFailure, CallMetadata, CancelSignal, ChargeRequest, CreateOrderRequest,
    HttpInventoryClient, HttpPaymentClient, InventoryService, OutcomeStatus, PaymentReply,
    PaymentService, RefundRequest, SagaCoordinator, StockReply, StockRequest,
};
use store::InMemoryStore;

const TIMEOUT: Duration = Duration::from_millis(500);

fn echo(headers: &HeaderMap) -> HeaderMap {
    let mut echoed = HeaderMap::new();
    if let Some(value) = headers.get("x-correlation-id") {
        echoed.insert("x-correlation-id", value.clone());
    }
    echoed
}

async fn reserve(headers: HeaderMap, Json(request): Json<StockRequest>) -> impl IntoResponse {
    let reply = if request.quantity > 5 {
        StockReply::rejected("Insufficient stock")
    } else {
        StockReply::accepted("reserved")
    };
    (echo(&headers), Json(reply))
}

async fn release() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn process(headers: HeaderMap, Json(request): Json<ChargeRequest>) -> impl IntoResponse {
    match request.user_id.as_str() {
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (echo(&headers), Json(PaymentReply::declined("too late"))).into_response()
        }
        "boom" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => (echo(&headers), Json(PaymentReply::accepted("PAY-REMOTE-1", "charged")))
            .into_response(),
    }
}

async fn refund() -> &'static str {
    "not json"
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/inventory/reserve", post(reserve))
        .route("/inventory/release", post(release))
        .route("/payments/process", post(process))
        .route("/payments/refund", post(refund));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn meta() -> CallMetadata {
    CallMetadata::new(CorrelationId::new("corr-http"))
}

fn stock(quantity: u32) -> StockRequest {
    StockRequest {
        order_id: OrderId::new(),
        product_id: ProductId::new("SKU-001"),
        quantity,
    }
}

fn charge(user: &str) -> ChargeRequest {
    ChargeRequest {
        order_id: OrderId::new(),
        amount: Money::from_cents(1999).unwrap(),
        user_id: UserId::new(user),
    }
}

#[tokio::test]
async fn test_reserve_answers_are_business_replies() {
    let base = spawn_stub().await;
    let client = HttpInventoryClient::new(&base, TIMEOUT).unwrap();

    let accepted = client.reserve_stock(&meta(), &stock(1)).await.unwrap();
    assert!(accepted.success);

    let rejected = client.reserve_stock(&meta(), &stock(9)).await.unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.message, "Insufficient stock");
}

#[tokio::test]
async fn test_service_unavailable_maps_to_circuit_open() {
    let base = spawn_stub().await;
    let client = HttpInventoryClient::new(&base, TIMEOUT).unwrap();

    let result = client.release_stock(&meta(), &stock(1)).await;
    assert_eq!(result, Err(CallFailure::CircuitOpen));
}

#[tokio::test]
async fn test_payment_success_timeout_and_server_error() {
    let base = spawn_stub().await;
    let client = HttpPaymentClient::new(&base, TIMEOUT).unwrap();

    let reply = client.process_payment(&meta(), &charge("user-1")).await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.payment_id.as_deref(), Some("PAY-REMOTE-1"));

    let slow = client.process_payment(&meta(), &charge("slow")).await;
    assert_eq!(slow, Err(CallFailure::Timeout));

    let boom = client.process_payment(&meta(), &charge("boom")).await;
    assert!(matches!(boom, Err(CallFailure::Transport(msg)) if msg.contains("500")));
}

#[tokio::test]
async fn test_undecodable_body_is_malformed() {
    let base = spawn_stub().await;
    let client = HttpPaymentClient::new(&base, TIMEOUT).unwrap();

    let refund = RefundRequest {
        payment_id: "PAY-REMOTE-1".to_string(),
        reason: "test".to_string(),
    };
    let result = client.refund_payment(&meta(), &refund).await;
    assert!(matches!(result, Err(CallFailure::Malformed(_))));
}

#[tokio::test]
async fn test_unreachable_participant_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpInventoryClient::new(&format!("http://{addr}/"), TIMEOUT).unwrap();
    let result = client.reserve_stock(&meta(), &stock(1)).await;
    assert!(matches!(result, Err(CallFailure::Transport(_))));
}

#[tokio::test]
async fn test_coordinator_over_http_participants() {
    let base = spawn_stub().await;
    let coordinator = SagaCoordinator::new(
        InMemoryStore::new(),
        HttpInventoryClient::new(&base, TIMEOUT).unwrap(),
        HttpPaymentClient::new(&base, TIMEOUT).unwrap(),
    );

    let reply = coordinator
        .create_order(
            CreateOrderRequest::new("user-1", "SKU-001", Decimal::new(1999, 2)),
            CancelSignal::never(),
        )
        .await;

    assert_eq!(reply.outcome.status, OutcomeStatus::Success);
    assert_eq!(reply.outcome.order_status, Some(OrderStatus::Completed));
    let order = coordinator
        .get_order(reply.outcome.order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_reference(), Some("PAY-REMOTE-1"));
}
