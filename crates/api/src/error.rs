//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use event_store::EventStoreError;
use gateway::GatewayError;
use ledger::LedgerError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Ledger operation error.
    Ledger(LedgerError),
    /// Saga/payment service error.
    Saga(SagaError),
    /// Gateway call error.
    Gateway(GatewayError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Ledger(err) => ledger_error_to_response(&err),
            ApiError::Saga(err) => saga_error_to_response(&err),
            ApiError::Gateway(err) => gateway_error_to_response(&err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn ledger_error_to_response(err: &LedgerError) -> (StatusCode, String) {
    match err {
        LedgerError::AccountNotFound(_) | LedgerError::ReservationNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        LedgerError::AccountExists(_) | LedgerError::InvalidState { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        LedgerError::InsufficientFunds { .. } | LedgerError::InvalidAmount(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        LedgerError::Domain(domain_err) => domain_error_to_response(domain_err),
    }
}

fn saga_error_to_response(err: &SagaError) -> (StatusCode, String) {
    match err {
        SagaError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        SagaError::PaymentNotFound(_) | SagaError::SagaNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        SagaError::Ledger(ledger_err) => ledger_error_to_response(ledger_err),
        SagaError::Gateway(gateway_err) => gateway_error_to_response(gateway_err),
        SagaError::Domain(domain_err) => domain_error_to_response(domain_err),
        SagaError::Projection(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn gateway_error_to_response(err: &GatewayError) -> (StatusCode, String) {
    match err {
        GatewayError::CircuitOpen { .. } => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        GatewayError::Timeout | GatewayError::Network(_) | GatewayError::Declined { .. } => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

fn domain_error_to_response(err: &DomainError) -> (StatusCode, String) {
    match err {
        DomainError::AggregateNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::Gateway(err)
    }
}
