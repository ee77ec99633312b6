//! Student device registration.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use domain::DomainError;
use serde::Deserialize;
use store::CanteenStore;

use super::AppState;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::ApiJson;

#[derive(Deserialize)]
pub struct DeviceTokenRequest {
    pub token: String,
}

/// POST /students/me/device-token, stores the push token for the caller's device.
#[tracing::instrument(skip(state, caller, req))]
pub async fn register_device_token<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<DeviceTokenRequest>,
) -> Result<StatusCode, ApiError> {
    let student_id = caller.student_id()?;
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("device token must not be empty".into()));
    }

    let updated = state
        .store
        .set_device_token(student_id, token)
        .await
        .map_err(DomainError::from)?;
    if !updated {
        return Err(DomainError::not_found("student", student_id).into());
    }
    tracing::info!(%student_id, "device token registered");
    Ok(StatusCode::NO_CONTENT)
}
