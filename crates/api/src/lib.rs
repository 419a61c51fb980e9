//! HTTP API server for the order system.
//!
//! Exposes the order saga, payment processor, and inventory ledger over
//! REST with structured logging (tracing) and Prometheus metrics. All
//! error-kind to status mapping happens in [`error::ApiError`].

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::{Money, ProductId};
use events::InMemoryEventBus;
use inventory::InMemoryInventoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::InMemoryOrderStore;
use payments::{PaymentProcessor, SimulatedGateway};
use saga::{InMemoryProductCatalog, OrderCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;

/// The coordinator as wired with the in-process collaborators.
pub type Coordinator = OrderCoordinator<
    InMemoryOrderStore,
    InMemoryInventoryLedger,
    InMemoryProductCatalog,
    SimulatedGateway,
    InMemoryEventBus,
>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Coordinator,
    pub ledger: Arc<InMemoryInventoryLedger>,
    pub payments: Arc<PaymentProcessor<SimulatedGateway>>,
    pub catalog: Arc<InMemoryProductCatalog>,
    pub bus: Arc<InMemoryEventBus>,
    pub gateway: SimulatedGateway,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/payments", post(routes::payments::create))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/payments/{id}/refund", post(routes::payments::refund))
        .route("/inventory/{id}", get(routes::inventory::get))
        .route("/inventory/{id}/reserve", post(routes::inventory::reserve))
        .route("/inventory/{id}/release", post(routes::inventory::release))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the in-memory collaborators into application state.
pub fn build_state(config: &Config) -> Arc<AppState> {
    let bus = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryOrderStore::new());
    let ledger = Arc::new(InMemoryInventoryLedger::new(bus.clone()));
    let catalog = Arc::new(InMemoryProductCatalog::new());
    let gateway = SimulatedGateway::new();
    let payments = Arc::new(PaymentProcessor::new(
        gateway.clone(),
        bus.clone(),
        config.gateway_timeout(),
    ));

    let coordinator = OrderCoordinator::new(
        store,
        ledger.clone(),
        catalog.clone(),
        payments.clone(),
        bus.clone(),
        config.pricing_rules(),
        config.retry_policy(),
    );

    Arc::new(AppState {
        coordinator,
        ledger,
        payments,
        catalog,
        bus,
        gateway,
    })
}

/// Builds application state seeded with a few demo products.
pub async fn create_default_state(config: &Config) -> Arc<AppState> {
    let state = build_state(config);

    let demo = [
        ("SKU-1001", "Mechanical Keyboard", 12_500_i64, 40_u32),
        ("SKU-1002", "Wireless Mouse", 4_999, 120),
        ("SKU-1003", "4K Monitor", 32_900, 15),
    ];
    for (sku, name, price_cents, stock) in demo {
        let product_id = ProductId::new();
        state
            .catalog
            .seed(product_id, sku, name, Money::from_cents(price_cents), stock)
            .await;
        state.ledger.seed(product_id, sku, stock, 10).await;
        tracing::info!(%product_id, sku, stock, "seeded demo product");
    }

    state
}
