//! Payment initiation and gateway callback endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use common::{Money, OrderId};
use domain::{CallbackOutcome, PaymentCallback, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::CanteenStore;

use super::{AppState, parse_id};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::ApiJson;

#[derive(Deserialize)]
pub struct PaymentCallbackRequest {
    pub transaction_reference: Option<String>,
    pub order_id: String,
    pub amount_cents: i64,
    pub status: String,
}

#[derive(Serialize)]
pub struct PaymentInitiatedResponse {
    pub order_id: String,
    pub transaction_reference: String,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// POST /orders/{id}/pay, issues a gateway reference for the owner's order.
#[tracing::instrument(skip(state, caller))]
pub async fn initiate<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<PaymentInitiatedResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let initiation = state
        .workflow
        .initiate_payment(order_id, caller.student_id()?)
        .await?;
    Ok(Json(PaymentInitiatedResponse {
        order_id: initiation.order_id.to_string(),
        transaction_reference: initiation.transaction_reference.to_string(),
        message: initiation.message,
    }))
}

/// POST /payment/callback, called by the payment gateway.
#[tracing::instrument(skip(state, req))]
pub async fn callback<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<PaymentCallbackRequest>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let callback = PaymentCallback {
        transaction_reference: req.transaction_reference,
        order_id: parse_id(&req.order_id, "order_id")?,
        amount: Money::from_cents(req.amount_cents),
        status: req.status.parse::<PaymentStatus>()?,
    };

    let response = match state.workflow.handle_payment_callback(callback).await? {
        CallbackOutcome::Settled { order, warning } => CallbackResponse {
            status: "settled",
            order_id: Some(order.id.to_string()),
            warning,
        },
        CallbackOutcome::Ignored => CallbackResponse {
            status: "ignored",
            order_id: None,
            warning: None,
        },
    };
    Ok(Json(response))
}
