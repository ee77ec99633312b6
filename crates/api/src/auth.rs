//! Caller identity and per-route role checks.
//!
//! The upstream gateway authenticates requests and forwards the caller's
//! identity in `x-user-id` and `x-user-roles`. One middleware resolves the
//! caller once per request and checks it against [`ROUTE_ROLES`].

use std::str::FromStr;

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use common::StudentId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Staff,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STUDENT" | "ROLE_STUDENT" => Ok(Role::Student),
            "STAFF" | "ROLE_STAFF" => Ok(Role::Staff),
            _ => Err(()),
        }
    }
}

const STUDENT: &[Role] = &[Role::Student];
const STAFF: &[Role] = &[Role::Staff];
const ANY_ROLE: &[Role] = &[Role::Student, Role::Staff];

/// Roles allowed on each protected route, keyed by method and route pattern.
/// Routes not listed are public.
pub static ROUTE_ROLES: &[(&str, &str, &[Role])] = &[
    ("POST", "/orders", STUDENT),
    ("GET", "/orders", STAFF),
    ("GET", "/orders/my-orders", STUDENT),
    ("GET", "/orders/rfid/{tag_id}", STAFF),
    ("GET", "/orders/{id}", ANY_ROLE),
    ("PATCH", "/orders/{id}/status", STAFF),
    ("POST", "/orders/{id}/dispatch", STAFF),
    ("POST", "/orders/{id}/confirm-collection", STUDENT),
    ("POST", "/orders/{id}/pay", STUDENT),
    ("GET", "/balances/me", STUDENT),
    ("PUT", "/balances/{student_id}", STAFF),
    ("POST", "/balances/{student_id}/credit", STAFF),
    ("POST", "/menu-items/{id}/stock", STAFF),
    ("GET", "/transactions", STAFF),
    ("GET", "/transactions/mine", STUDENT),
    ("GET", "/earnings/daily", STAFF),
    ("POST", "/rfid/request-otp", STUDENT),
    ("POST", "/rfid/register", STUDENT),
    ("POST", "/rfid/admin/register", STAFF),
    ("GET", "/rfid/{tag_id}", ANY_ROLE),
    ("POST", "/students/me/device-token", STUDENT),
    ("GET", "/staff/events/{topic}", STAFF),
];

/// Returns the roles a route requires, or `None` for public routes.
pub fn required_roles(method: &Method, path: &str) -> Option<&'static [Role]> {
    ROUTE_ROLES
        .iter()
        .find(|(m, p, _)| *m == method.as_str() && *p == path)
        .map(|(_, _, roles)| *roles)
}

/// The authenticated caller of a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Option<StudentId>,
    pub roles: Vec<Role>,
}

impl Caller {
    /// Reads the caller from gateway headers. Unknown roles are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let id = match headers.get(USER_ID_HEADER) {
            None => None,
            Some(value) => {
                let id = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<StudentId>().ok())
                    .ok_or_else(|| ApiError::Unauthorized("invalid x-user-id header".into()))?;
                Some(id)
            }
        };
        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(',').filter_map(|r| r.parse().ok()).collect())
            .unwrap_or_default();
        Ok(Self { id, roles })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_staff(&self) -> bool {
        self.has_role(Role::Staff)
    }

    /// Returns the caller's student id.
    pub fn student_id(&self) -> Result<StudentId, ApiError> {
        self.id
            .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".into()))
    }
}

/// Middleware enforcing [`ROUTE_ROLES`]. Must run as a route layer so the
/// matched route pattern is known.
pub async fn authorize(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let Some(path) = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_owned()) else {
        return Ok(next.run(req).await);
    };
    let Some(required) = required_roles(req.method(), &path) else {
        return Ok(next.run(req).await);
    };

    let caller = Caller::from_headers(req.headers())?;
    if caller.roles.is_empty() {
        return Err(ApiError::Unauthorized("missing caller identity".into()));
    }
    if !required.iter().any(|role| caller.has_role(*role)) {
        tracing::debug!(%path, roles = ?caller.roles, "caller lacks required role");
        return Err(ApiError::Forbidden(format!(
            "{} {path} requires one of {required:?}",
            req.method()
        )));
    }
    if required == STUDENT && caller.id.is_none() {
        return Err(ApiError::Unauthorized("missing x-user-id header".into()));
    }

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
