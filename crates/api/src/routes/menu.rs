//! Menu stock endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::MenuItemId;
use serde::{Deserialize, Serialize};
use store::{CanteenStore, MenuItem};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::ApiJson;

#[derive(Deserialize)]
pub struct StockAdjustmentRequest {
    /// Signed change: positive restocks, negative writes off.
    pub delta: i32,
}

#[derive(Serialize)]
pub struct MenuItemResponse {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub stock: i32,
    pub tags: Vec<String>,
}

impl From<MenuItem> for MenuItemResponse {
    fn from(item: MenuItem) -> Self {
        Self {
            id: item.id.to_string(),
            name: item.name,
            price_cents: item.price.cents(),
            stock: item.stock,
            tags: item.tags,
        }
    }
}

/// POST /menu-items/{id}/stock
#[tracing::instrument(skip(state, req))]
pub async fn adjust_stock<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StockAdjustmentRequest>,
) -> Result<Json<MenuItemResponse>, ApiError> {
    let id: MenuItemId = parse_id(&id, "menu item id")?;
    let item = state.workflow.stock().adjust(id, req.delta).await?;
    Ok(Json(item.into()))
}
