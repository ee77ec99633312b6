//! RFID tag registration endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use common::StudentId;
use serde::{Deserialize, Serialize};
use store::{CanteenStore, RfidMapping};

use super::{AppState, parse_id};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::ApiJson;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub tag_id: String,
    pub otp: String,
}

#[derive(Deserialize)]
pub struct AdminRegisterRequest {
    pub tag_id: String,
    pub student_id: String,
}

#[derive(Serialize)]
pub struct RfidMappingResponse {
    pub tag_id: String,
    pub student_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<RfidMapping> for RfidMappingResponse {
    fn from(mapping: RfidMapping) -> Self {
        Self {
            tag_id: mapping.tag_id,
            student_id: mapping.student_id.to_string(),
            created_at: mapping.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /rfid/request-otp, sends a registration code to the caller.
#[tracing::instrument(skip(state, caller))]
pub async fn request_otp<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.rfid.request_otp(caller.student_id()?).await?;
    Ok(Json(MessageResponse {
        message: "OTP sent to your registered email.",
    }))
}

/// POST /rfid/register, binds a tag to the caller after checking the code.
#[tracing::instrument(skip(state, caller, req))]
pub async fn register<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<RfidMappingResponse>, ApiError> {
    let mapping = state
        .rfid
        .register_with_otp(caller.student_id()?, &req.tag_id, &req.otp)
        .await?;
    Ok(Json(mapping.into()))
}

/// POST /rfid/admin/register, binds a tag to any student.
#[tracing::instrument(skip(state, req))]
pub async fn admin_register<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<AdminRegisterRequest>,
) -> Result<Json<RfidMappingResponse>, ApiError> {
    let student_id: StudentId = parse_id(&req.student_id, "student_id")?;
    let mapping = state.rfid.register(student_id, &req.tag_id).await?;
    Ok(Json(mapping.into()))
}

/// GET /rfid/{tag_id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(tag_id): Path<String>,
) -> Result<Json<RfidMappingResponse>, ApiError> {
    let mapping = state.rfid.get(&tag_id).await?;
    Ok(Json(mapping.into()))
}
