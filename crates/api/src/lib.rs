//! HTTP API server with observability for the payment orchestration system.
//!
//! Provides REST endpoints for payments, accounts, audit (event history and
//! state reconstruction), and gateway/circuit-breaker operations, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use event_store::EventStore;
use gateway::{GatewaySimulator, PaymentGateway};
use ledger::AccountLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{AccountBalanceView, PaymentStatusView, Projection, ProjectionProcessor};
use saga::PaymentService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/payments", post(routes::payments::create::<S>))
        .route("/payments", get(routes::payments::list::<S>))
        .route("/payments/{id}", get(routes::payments::get::<S>))
        .route("/payments/{id}/saga", get(routes::payments::saga_status::<S>))
        .route("/accounts", post(routes::accounts::create::<S>))
        .route("/accounts", get(routes::accounts::list::<S>))
        .route("/accounts/{user_id}", get(routes::accounts::get::<S>))
        .route(
            "/accounts/{user_id}/balance",
            post(routes::accounts::top_up::<S>),
        )
        .route(
            "/ledger/aggregates/{type}/{id}/history",
            get(routes::ledger::history::<S>),
        )
        .route(
            "/ledger/aggregates/{type}/{id}/state",
            get(routes::ledger::reconstruct::<S>),
        )
        .route(
            "/ledger/projections/rebuild",
            post(routes::ledger::rebuild_projections::<S>),
        )
        .route(
            "/ledger/payments/{id}/status",
            get(routes::ledger::payment_status::<S>),
        )
        .route(
            "/ledger/accounts/{id}/balance",
            get(routes::ledger::account_balance::<S>),
        )
        .route("/gateway/health", get(routes::gateway::health::<S>))
        .route(
            "/gateway/circuit/metrics",
            get(routes::gateway::circuit_metrics::<S>),
        )
        .route(
            "/gateway/circuit/reset",
            post(routes::gateway::circuit_reset::<S>),
        )
        .route(
            "/gateway/simulate/unhealthy",
            patch(routes::gateway::simulate_unhealthy::<S>),
        )
        .route(
            "/gateway/simulate/healthy",
            patch(routes::gateway::simulate_healthy::<S>),
        )
        .route(
            "/gateway/simulate/latency",
            patch(routes::gateway::simulate_latency::<S>),
        )
        .route(
            "/gateway/simulate/mode",
            patch(routes::gateway::simulate_mode::<S>),
        )
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

/// Creates the default application state: ledger, simulated gateway behind
/// the circuit breaker, payment service, and registered read models.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
) -> (Arc<AppState<S>>, Arc<ProjectionProcessor<S>>) {
    let store = Arc::new(event_store.clone());

    let ledger = AccountLedger::new(Arc::clone(&store));
    let gateway = PaymentGateway::new(Arc::new(GatewaySimulator::new()));

    let payment_status = Arc::new(PaymentStatusView::new());
    let account_balances = Arc::new(AccountBalanceView::new());

    let mut processor = ProjectionProcessor::new(event_store);
    processor.register(Box::new(payment_status.as_ref().clone()) as Box<dyn Projection>);
    processor.register(Box::new(account_balances.as_ref().clone()) as Box<dyn Projection>);
    let processor = Arc::new(processor);

    let payment_service = PaymentService::new(
        Arc::clone(&store),
        ledger.clone(),
        gateway.clone(),
    )
    .with_projections(Arc::clone(&processor));

    let state = Arc::new(AppState {
        payment_service,
        ledger,
        gateway,
        payment_status,
        account_balances,
        event_store: store,
        projection_processor: Arc::clone(&processor),
    });

    (state, processor)
}
