//! Account management endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, UserId};
use event_store::EventStore;
use ledger::Account;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: String,
    #[serde(default)]
    pub initial_balance_cents: i64,
}

#[derive(Deserialize)]
pub struct TopUpRequest {
    pub amount_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub user_id: String,
    pub balance_cents: i64,
    pub reserved_balance_cents: i64,
    pub available_balance_cents: i64,
    pub created_at: String,
}

impl AccountResponse {
    fn from_account(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            user_id: account.user_id.to_string(),
            balance_cents: account.balance.cents(),
            reserved_balance_cents: account.reserved_balance.cents(),
            available_balance_cents: account.available_balance().cents(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /accounts — create an account, optionally funded.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let account = state
        .ledger
        .create_account(
            UserId::new(req.user_id),
            Money::from_cents(req.initial_balance_cents),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse::from_account(&account)),
    ))
}

/// GET /accounts — list all accounts.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<AccountResponse>>, ApiError> {
    let accounts = state.ledger.list_accounts().await;
    Ok(Json(
        accounts.iter().map(AccountResponse::from_account).collect(),
    ))
}

/// GET /accounts/:user_id — the account owned by a user.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .ledger
        .find_by_user(&UserId::new(user_id.clone()))
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No account found for user {user_id}")))?;

    Ok(Json(AccountResponse::from_account(&account)))
}

/// POST /accounts/:user_id/balance — credit an account.
#[tracing::instrument(skip(state, req))]
pub async fn top_up<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .ledger
        .add_balance(&UserId::new(user_id), Money::from_cents(req.amount_cents))
        .await?;

    Ok(Json(AccountResponse::from_account(&account)))
}
