//! Gateway health, circuit breaker, and fault simulation endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use gateway::{CircuitMetrics, FailureMode, GatewayHealth, GatewayStats};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct LatencyRequest {
    pub latency_ms: u64,
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: FailureMode,
}

// -- Handlers --

/// GET /gateway/health — gateway self-report, bypassing the breaker.
#[tracing::instrument(skip(state))]
pub async fn health<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<GatewayHealth>, ApiError> {
    let health = state.gateway.health_check().await?;
    Ok(Json(health))
}

/// GET /gateway/circuit/metrics — circuit breaker metrics snapshot.
#[tracing::instrument(skip(state))]
pub async fn circuit_metrics<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<CircuitMetrics> {
    Json(state.gateway.circuit_metrics().await)
}

/// POST /gateway/circuit/reset — force the breaker closed.
#[tracing::instrument(skip(state))]
pub async fn circuit_reset<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<CircuitMetrics> {
    state.gateway.reset_circuit().await;
    Json(state.gateway.circuit_metrics().await)
}

/// PATCH /gateway/simulate/unhealthy — all gateway calls fail.
#[tracing::instrument(skip(state))]
pub async fn simulate_unhealthy<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<GatewayStats> {
    state.gateway.client().make_unhealthy();
    Json(state.gateway.client().stats())
}

/// PATCH /gateway/simulate/healthy — restore the gateway.
#[tracing::instrument(skip(state))]
pub async fn simulate_healthy<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<GatewayStats> {
    state.gateway.client().make_healthy();
    Json(state.gateway.client().stats())
}

/// PATCH /gateway/simulate/latency — set simulated response latency.
#[tracing::instrument(skip(state, req))]
pub async fn simulate_latency<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<LatencyRequest>,
) -> Json<GatewayStats> {
    state
        .gateway
        .client()
        .set_latency(Duration::from_millis(req.latency_ms));
    Json(state.gateway.client().stats())
}

/// PATCH /gateway/simulate/mode — set the failure mode.
#[tracing::instrument(skip(state, req))]
pub async fn simulate_mode<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ModeRequest>,
) -> Json<GatewayStats> {
    state.gateway.client().set_mode(req.mode);
    Json(state.gateway.client().stats())
}
