//! Payment creation and inspection endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, UserId};
use domain::{Aggregate, PaymentRecord};
use event_store::EventStore;
use saga::{CreatePayment, SagaExecution};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_aggregate_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub user_id: String,
    pub amount_cents: i64,
    pub idempotency_key: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub reservation_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<String>,
}

impl PaymentResponse {
    fn from_record(payment: &PaymentRecord) -> Self {
        Self {
            id: payment.id().map(|id| id.to_string()).unwrap_or_default(),
            user_id: payment
                .user_id()
                .map(|u| u.to_string())
                .unwrap_or_default(),
            amount_cents: payment.amount().cents(),
            status: payment.status().to_string(),
            reservation_id: payment.reservation_id().map(|id| id.to_string()),
            gateway_transaction_id: payment.gateway_transaction_id().map(String::from),
            failure_reason: payment.failure_reason().map(String::from),
            completed_at: payment.completed_at().map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct SagaStepResponse {
    pub step_name: String,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub saga_id: String,
    pub payment_id: String,
    pub status: String,
    pub current_step: Option<String>,
    pub steps: Vec<SagaStepResponse>,
    pub reservation_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl SagaStatusResponse {
    fn from_execution(saga: &SagaExecution) -> Self {
        Self {
            saga_id: saga.id().map(|id| id.to_string()).unwrap_or_default(),
            payment_id: saga
                .payment_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            status: saga.status().to_string(),
            current_step: saga.current_step().map(String::from),
            steps: saga
                .steps()
                .iter()
                .map(|s| SagaStepResponse {
                    step_name: s.step_name.clone(),
                    status: s.status.to_string(),
                    error: s.error.clone(),
                })
                .collect(),
            reservation_id: saga.reservation_id().map(|id| id.to_string()),
            gateway_transaction_id: saga.gateway_transaction_id().map(String::from),
            failure_reason: saga.failure_reason().map(String::from),
        }
    }
}

// -- Handlers --

/// POST /payments — create a payment and run its saga to completion.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let payment = state
        .payment_service
        .create_payment(CreatePayment {
            user_id: UserId::new(req.user_id),
            amount: Money::from_cents(req.amount_cents),
            idempotency_key: req.idempotency_key,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from_record(&payment))))
}

/// GET /payments — list all payments.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let payments = state.payment_service.list_payments().await?;
    Ok(Json(
        payments.iter().map(PaymentResponse::from_record).collect(),
    ))
}

/// GET /payments/:id — load one payment.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let payment = state
        .payment_service
        .find_payment(payment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Payment {id} not found")))?;

    Ok(Json(PaymentResponse::from_record(&payment)))
}

/// GET /payments/:id/saga — saga execution history for a payment.
#[tracing::instrument(skip(state))]
pub async fn saga_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let saga = state
        .payment_service
        .find_saga_execution(payment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No saga execution for payment {id}")))?;

    Ok(Json(SagaStatusResponse::from_execution(&saga)))
}
