//! Transaction history and earnings endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use store::{CanteenStore, TransactionRecord};

use super::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct TransactionResponse {
    pub student_id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            student_id: record.student_id.to_string(),
            order_id: record.order_id.to_string(),
            amount_cents: record.amount.cents(),
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct DailyEarningsResponse {
    pub daily_earnings_cents: i64,
}

/// GET /transactions
#[tracing::instrument(skip(state))]
pub async fn list<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let records = state.workflow.transactions().list_all().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// GET /transactions/mine
#[tracing::instrument(skip(state, caller))]
pub async fn mine<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let records = state
        .workflow
        .transactions()
        .list_for_student(caller.student_id()?)
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// GET /earnings/daily, takings since 00:00 UTC today.
#[tracing::instrument(skip(state))]
pub async fn daily_earnings<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<DailyEarningsResponse>, ApiError> {
    let start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1);
    let total = state.workflow.transactions().sum_between(start, end).await?;
    Ok(Json(DailyEarningsResponse {
        daily_earnings_cents: total.cents(),
    }))
}
