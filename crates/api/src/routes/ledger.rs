//! Audit endpoints: event history, state reconstruction, projections.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{AccountState, AggregateStore, PaymentRecord};
use event_store::{EventQuery, EventStore};
use saga::SagaExecution;
use serde::Serialize;

use super::{AppState, parse_aggregate_id};
use crate::error::ApiError;

/// Response type for event envelope data.
#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub version: i64,
    pub user_id: Option<String>,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
pub struct RebuildResponse {
    pub rebuilt: usize,
}

// -- Handlers --

/// GET /ledger/aggregates/:type/:id/history — full event history.
#[tracing::instrument(skip(state))]
pub async fn history<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((aggregate_type, id)): Path<(String, String)>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;

    let envelopes = state
        .event_store
        .query_events(EventQuery::for_aggregate(aggregate_id).aggregate_type(aggregate_type))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if envelopes.is_empty() {
        return Err(ApiError::NotFound(format!("No events for aggregate {id}")));
    }

    let responses: Vec<EventEnvelopeResponse> = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            aggregate_type: e.aggregate_type,
            version: e.version.as_i64(),
            user_id: e.user_id.map(|u| u.to_string()),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

/// GET /ledger/aggregates/:type/:id/state — reconstruct an aggregate by
/// folding its event history.
#[tracing::instrument(skip(state))]
pub async fn reconstruct<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((aggregate_type, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;
    let store = Arc::clone(&state.event_store);

    let value = match aggregate_type.as_str() {
        "Payment" => {
            let payments: AggregateStore<S, PaymentRecord> = AggregateStore::new(store);
            let payment = payments
                .load_existing(aggregate_id)
                .await
                .map_err(saga::SagaError::from)?;
            payment.map(|p| serde_json::to_value(&p)).transpose()
        }
        "Account" => {
            let accounts: AggregateStore<S, AccountState> = AggregateStore::new(store);
            let account = accounts
                .load_existing(aggregate_id)
                .await
                .map_err(saga::SagaError::from)?;
            account.map(|a| serde_json::to_value(&a)).transpose()
        }
        "PaymentSaga" => {
            let sagas: AggregateStore<S, SagaExecution> = AggregateStore::new(store);
            let saga = sagas
                .load_existing(aggregate_id)
                .await
                .map_err(saga::SagaError::from)?;
            saga.map(|s| serde_json::to_value(&s)).transpose()
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown aggregate type: {other}"
            )));
        }
    };

    let value = value
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Aggregate {id} not found")))?;

    Ok(Json(value))
}

/// POST /ledger/projections/rebuild — reset all views and replay the log.
#[tracing::instrument(skip(state))]
pub async fn rebuild_projections<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<RebuildResponse>, ApiError> {
    state
        .projection_processor
        .rebuild_all()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(RebuildResponse {
        rebuilt: state.projection_processor.projection_count(),
    }))
}

/// GET /ledger/payments/:id/status — payment status from the read model.
#[tracing::instrument(skip(state))]
pub async fn payment_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;

    // Fold in any events appended since the last catch-up.
    state
        .projection_processor
        .run_catch_up()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let summary = state
        .payment_status
        .get_payment(payment_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Payment {id} not found")))?;

    serde_json::to_value(&summary)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /ledger/accounts/:id/balance — account balances from the read model.
#[tracing::instrument(skip(state))]
pub async fn account_balance<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account_id = parse_aggregate_id(&id)?;

    state
        .projection_processor
        .run_catch_up()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let summary = state
        .account_balances
        .get_account(account_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Account {id} not found")))?;

    serde_json::to_value(&summary)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}
