//! Order placement, status transition and lookup endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus};
use domain::{DispatchOutcome, OrderLine, OrderOutcome};
use serde::{Deserialize, Serialize};
use store::{CanteenStore, Order};

use super::{AppState, parse_id};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::ApiJson;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    #[serde(alias = "menuItemId")]
    pub menu_item_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub student_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub menu_item_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl OrderResponse {
    pub fn new(order: Order, warning: Option<String>) -> Self {
        let items = order
            .items
            .iter()
            .map(|item| OrderItemResponse {
                menu_item_id: item.menu_item_id.to_string(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price.cents(),
            })
            .collect();
        Self {
            id: order.id.to_string(),
            student_id: order.student_id.to_string(),
            status: order.status,
            items,
            total_cents: order.total.cents(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            warning,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self::new(order, None)
    }
}

impl From<OrderOutcome> for OrderResponse {
    fn from(outcome: OrderOutcome) -> Self {
        Self::new(outcome.order, outcome.warning)
    }
}

impl From<DispatchOutcome> for OrderResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self::new(outcome.order, outcome.warning)
    }
}

// -- Handlers --

/// POST /orders, places a paid order for the calling student.
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let student_id = caller.student_id()?;
    let lines = req
        .items
        .iter()
        .map(|item| {
            Ok(OrderLine::new(
                parse_id(&item.menu_item_id, "menu_item_id")?,
                item.quantity,
            ))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let outcome = state.workflow.create_order(student_id, lines).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// GET /orders, lists every order for staff.
#[tracing::instrument(skip(state))]
pub async fn list<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.workflow.list_orders().await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/my-orders, lists the calling student's orders.
#[tracing::instrument(skip(state, caller))]
pub async fn mine<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.workflow.list_orders_for(caller.student_id()?).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/{id}, visible to staff and to the owning student.
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.workflow.get_order(order_id).await?;
    if !caller.is_staff() && caller.id != Some(order.student_id) {
        return Err(ApiError::Forbidden(format!(
            "order {order_id} belongs to another student"
        )));
    }
    Ok(Json(order.into()))
}

/// GET /orders/rfid/{tag_id}, the tagged student's newest active order.
#[tracing::instrument(skip(state))]
pub async fn by_rfid<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(tag_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.workflow.lookup_by_rfid(&tag_id).await?;
    Ok(Json(order.into()))
}

/// PATCH /orders/{id}/status, sets a status without transition checks.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: common::ParseStatusError| ApiError::BadRequest(e.to_string()))?;
    let order = state.workflow.update_status(order_id, status).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/dispatch, hands a paid order to the counter.
#[tracing::instrument(skip(state))]
pub async fn dispatch<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let outcome = state.workflow.dispatch(order_id).await?;
    Ok(Json(outcome.into()))
}

/// POST /orders/{id}/confirm-collection, the owner confirms pickup.
#[tracing::instrument(skip(state, caller))]
pub async fn confirm_collection<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let outcome = state
        .workflow
        .confirm_collection(order_id, caller.student_id()?)
        .await?;
    Ok(Json(outcome.into()))
}
