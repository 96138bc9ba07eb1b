//! HTTP route handlers.

pub mod accounts;
pub mod gateway;
pub mod health;
pub mod ledger;
pub mod metrics;
pub mod payments;

use std::sync::Arc;

use ::gateway::{GatewaySimulator, PaymentGateway};
use ::ledger::AccountLedger;
use common::AggregateId;
use event_store::EventStore;
use projections::{AccountBalanceView, PaymentStatusView, ProjectionProcessor};
use saga::PaymentService;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub payment_service: PaymentService<S, GatewaySimulator>,
    pub ledger: AccountLedger<S>,
    pub gateway: PaymentGateway<GatewaySimulator>,
    pub payment_status: Arc<PaymentStatusView>,
    pub account_balances: Arc<AccountBalanceView>,
    pub event_store: Arc<S>,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
}

fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(AggregateId::from(uuid))
}
