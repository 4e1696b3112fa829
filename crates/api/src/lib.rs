//! HTTP API server with observability for the order saga system.
//!
//! Exposes the create-order saga over REST, plus read-only order and saga
//! inspection, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HttpInventoryClient, HttpPaymentClient, InMemoryInventoryService, InMemoryPaymentService,
    SagaCoordinator,
};
use store::{InMemoryStore, PostgresStore, SagaStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;
use routes::orders::{AppState, DynInventory, DynPayment};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/saga", get(routes::orders::saga_history::<S>))
        .with_state(state)
        .merge(metrics_router)
        .route_layer(middleware::from_fn(routes::metrics::track_requests))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the participant clients the configuration asks for.
///
/// A participant without a configured URL runs in memory, seeded with
/// `demo_stock` units of every product.
pub fn build_participants(config: &Config) -> Result<(DynInventory, DynPayment), StartupError> {
    let inventory: DynInventory = match &config.inventory_url {
        Some(url) => {
            tracing::info!(%url, "using remote inventory participant");
            Arc::new(
                HttpInventoryClient::new(url, config.participant_timeout).map_err(|e| {
                    StartupError::Participant {
                        participant: "inventory",
                        message: e.to_string(),
                    }
                })?,
            )
        }
        None => Arc::new(InMemoryInventoryService::with_default_stock(config.demo_stock)),
    };

    let payment: DynPayment = match &config.payment_url {
        Some(url) => {
            tracing::info!(%url, "using remote payment participant");
            Arc::new(
                HttpPaymentClient::new(url, config.participant_timeout).map_err(|e| {
                    StartupError::Participant {
                        participant: "payment",
                        message: e.to_string(),
                    }
                })?,
            )
        }
        None => Arc::new(InMemoryPaymentService::new()),
    };

    Ok((inventory, payment))
}

/// Connects to PostgreSQL and applies pending migrations.
pub async fn connect_postgres(
    database_url: &str,
    config: &Config,
) -> Result<PostgresStore, StartupError> {
    let store = PostgresStore::connect(database_url, config.database_max_connections).await?;
    store.run_migrations().await?;
    Ok(store)
}

/// Creates application state over `store` with the given participants.
pub fn create_state<S: SagaStore>(
    store: S,
    inventory: DynInventory,
    payment: DynPayment,
    config: &Config,
) -> Arc<AppState<S>> {
    let coordinator = SagaCoordinator::new(store, inventory, payment)
        .with_idempotency_ttl(config.idempotency_ttl());
    Arc::new(AppState {
        coordinator,
        saga_timeout: config.saga_timeout,
    })
}

/// Creates the default application state: in-memory storage and participants.
pub fn create_default_state(config: &Config) -> Arc<AppState<InMemoryStore>> {
    let inventory: DynInventory = Arc::new(InMemoryInventoryService::with_default_stock(
        config.demo_stock,
    ));
    let payment: DynPayment = Arc::new(InMemoryPaymentService::new());
    create_state(InMemoryStore::new(), inventory, payment, config)
}
