//! Prepaid balance endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use common::{Money, StudentId};
use serde::{Deserialize, Serialize};
use store::{Balance, CanteenStore};

use super::{AppState, parse_id};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::ApiJson;

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount_cents: i64,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub student_id: String,
    pub amount_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            student_id: balance.student_id.to_string(),
            amount_cents: balance.amount.cents(),
            updated_at: balance.updated_at,
        }
    }
}

/// GET /balances/me
#[tracing::instrument(skip(state, caller))]
pub async fn mine<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.workflow.ledger().get(caller.student_id()?).await?;
    Ok(Json(balance.into()))
}

/// POST /balances/{student_id}/credit, tops up a student's balance.
#[tracing::instrument(skip(state, req))]
pub async fn credit<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(student_id): Path<String>,
    ApiJson(req): ApiJson<AmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let student_id: StudentId = parse_id(&student_id, "student id")?;
    let balance = state
        .workflow
        .ledger()
        .credit(student_id, Money::from_cents(req.amount_cents))
        .await?;
    Ok(Json(balance.into()))
}

/// PUT /balances/{student_id}, overwrites a student's balance.
#[tracing::instrument(skip(state, req))]
pub async fn set<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(student_id): Path<String>,
    ApiJson(req): ApiJson<AmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let student_id: StudentId = parse_id(&student_id, "student id")?;
    let balance = state
        .workflow
        .ledger()
        .set(student_id, Money::from_cents(req.amount_cents))
        .await?;
    Ok(Json(balance.into()))
}
