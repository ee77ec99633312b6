//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
///
/// Bodies are always `{"error": <message>, "code": <code>}`.
#[derive(Debug)]
pub enum ApiError {
    /// Domain rule or lookup failure.
    Domain(DomainError),
    /// Malformed request from the client.
    BadRequest(String),
    /// No caller identity on a protected route.
    Unauthorized(String),
    /// Caller lacks the role the route requires.
    Forbidden(String),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Domain(err) => domain_error_parts(err),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_INPUT", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = serde_json::json!({ "error": message, "code": code });
        (status, Json(body)).into_response()
    }
}

fn domain_error_parts(err: DomainError) -> (StatusCode, &'static str, String) {
    let status = match &err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InsufficientStock { .. }
        | DomainError::InsufficientBalance { .. }
        | DomainError::InvalidState { .. }
        | DomainError::DuplicateTransaction { .. } => StatusCode::CONFLICT,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::BadInput(_) => StatusCode::BAD_REQUEST,
        DomainError::Store(store_err) => {
            tracing::error!(error = %store_err, "store failure");
            return internal();
        }
    };
    (status, err.code(), err.to_string())
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL",
        "internal server error".to_string(),
    )
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
