//! Integration tests for the API server.

use std::sync::OnceLock;

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_default_state(&Config::default());
    api::create_app(state, get_metrics_handle())
}

fn order_body(product_id: &str, amount: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "user_id": "user-1",
        "product_id": product_id,
        "amount": amount,
        "quantity": 2
    })
}

fn post_order(body: &serde_json::Value, idempotency_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("idempotency-key", key);
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order_completes_saga() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("SKU-001", "49.99".into()), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-correlation-id"));
    assert!(!response.headers().contains_key("idempotent-replayed"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "SUCCESS");
    assert_eq!(json["order_status"], "COMPLETED");
    assert!(json["order_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_order_accepts_numeric_amount() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("SKU-001", serde_json::json!(12.5)), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let app = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-correlation-id", "trace-abc-123")
        .body(Body::from(
            serde_json::to_string(&order_body("SKU-001", "10.00".into())).unwrap(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-correlation-id"], "trace-abc-123");
}

#[tokio::test]
async fn test_finalization_failure_returns_unprocessable() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("fail-me", "20.00".into()), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["status"], "FAILED");
    assert_eq!(json["order_status"], "FAILED_FULL_COMPENSATION_APPLIED");
}

#[tokio::test]
async fn test_payment_over_limit_releases_stock() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("SKU-001", "20000.00".into()), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["order_status"], "PAYMENT_FAILED_STOCK_RELEASED");
}

#[tokio::test]
async fn test_invalid_amount_returns_bad_request() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("SKU-001", "ten dollars".into()), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_positive_amount_returns_bad_request() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("SKU-001", "-5.00".into()), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ERROR");
    assert!(json.get("order_id").is_none());
}

#[tokio::test]
async fn test_malformed_body_returns_bad_request() {
    let app = setup();

    let response = app
        .oneshot(post_order(&serde_json::json!({ "user_id": "user-1" }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_repeated_idempotency_key_replays_response() {
    let app = setup();
    let body = order_body("SKU-001", "15.00".into());

    let first = app
        .clone()
        .oneshot(post_order(&body, Some("order-key-1")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_json = body_json(first).await;

    let second = app
        .oneshot(post_order(&body, Some("order-key-1")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(second.headers()["idempotent-replayed"], "true");
    let second_json = body_json(second).await;
    assert_eq!(first_json, second_json);
}

#[tokio::test]
async fn test_reused_key_with_different_body_conflicts() {
    let app = setup();

    let first = app
        .clone()
        .oneshot(post_order(
            &order_body("SKU-001", "15.00".into()),
            Some("order-key-2"),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(post_order(
            &order_body("SKU-001", "99.00".into()),
            Some("order-key-2"),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_idempotency_key_returns_bad_request() {
    let app = setup();

    let response = app
        .oneshot(post_order(&order_body("SKU-001", "15.00".into()), Some("   ")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = setup();

    let created = app
        .clone()
        .oneshot(post_order(&order_body("SKU-001", "30.00".into()), None))
        .await
        .unwrap();
    let created_json = body_json(created).await;
    let order_id = created_json["order_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(get(&format!("/orders/{order_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], order_id.as_str());
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(json["amount"], "30.00");
    assert_eq!(json["quantity"], 2);
    assert!(json["payment_reference"].as_str().is_some());
}

#[tokio::test]
async fn test_saga_history_lists_steps_in_order() {
    let app = setup();

    let created = app
        .clone()
        .oneshot(post_order(&order_body("SKU-001", "30.00".into()), None))
        .await
        .unwrap();
    let order_id = body_json(created).await["order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(get(&format!("/orders/{order_id}/saga")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["saga_id"], order_id.as_str());
    assert_eq!(json["order_status"], "COMPLETED");
    let steps: Vec<&str> = json["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["step"].as_str().unwrap())
        .collect();
    assert_eq!(steps.first(), Some(&"OrderCreated"));
    assert_eq!(steps.last(), Some(&"SagaCompleted"));
    assert!(steps.contains(&"PaymentCompleted"));
}

#[tokio::test]
async fn test_get_unknown_order_returns_404() {
    let app = setup();

    let response = app
        .oneshot(get("/orders/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_order_with_bad_id_returns_400() {
    let app = setup();

    let response = app.oneshot(get("/orders/not-a-uuid")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let created = app
        .clone()
        .oneshot(post_order(&order_body("SKU-001", "5.00".into()), None))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_executions_total"));
    assert!(text.contains("http_requests_total"));
}
